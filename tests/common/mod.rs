// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use splitledger::application::LedgerService;
use splitledger::domain::{GroupId, MemberId};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Path of the database inside a temp dir created by `test_service`
pub fn db_path(temp_dir: &TempDir) -> String {
    temp_dir.path().join("test.db").to_str().unwrap().to_string()
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Test fixture: a group with three members A, B and C
pub struct Trio {
    pub group: GroupId,
    pub a: MemberId,
    pub b: MemberId,
    pub c: MemberId,
}

impl Trio {
    pub async fn create(service: &LedgerService, name: &str) -> Result<Self> {
        let group = service.create_group(name.into(), "EUR".into()).await?;
        let a = service.add_member(group.id, "A".into()).await?;
        let b = service.add_member(group.id, "B".into()).await?;
        let c = service.add_member(group.id, "C".into()).await?;
        Ok(Self {
            group: group.id,
            a: a.id,
            b: b.id,
            c: c.id,
        })
    }

    /// Balance of one member, looked up through the service
    pub async fn balance_of(&self, service: &LedgerService, member: MemberId) -> Result<i64> {
        let balances = service.get_balances(self.group).await?;
        Ok(balances
            .iter()
            .find(|b| b.member_id == member)
            .map(|b| b.amount)
            .unwrap_or(0))
    }
}
