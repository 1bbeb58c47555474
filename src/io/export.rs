use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::str::FromStr;

use crate::application::LedgerService;
use crate::domain::{Cents, GroupId, MemberId};

/// Output format for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => anyhow::bail!("Invalid export format '{}'. Valid formats: csv, json", s),
        }
    }
}

/// One exported balance line: the client `Balance` shape plus the member's name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRow {
    pub member_id: MemberId,
    pub member_name: String,
    /// Cents
    pub amount: Cents,
}

/// One exported settlement line: the client `Settlement` shape plus names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRow {
    pub from_member_id: MemberId,
    pub to_member_id: MemberId,
    pub from_name: String,
    pub to_name: String,
    /// Cents
    pub amount: Cents,
}

/// Exporter for converting a group's balances and settlements to CSV or JSON
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    pub async fn balance_rows(&self, group_id: GroupId) -> Result<Vec<BalanceRow>> {
        let names = self.service.member_names(group_id).await?;
        let balances = self.service.get_balances(group_id).await?;

        Ok(balances
            .iter()
            .map(|b| BalanceRow {
                member_id: b.member_id,
                member_name: display_name(&names, b.member_id),
                amount: b.amount,
            })
            .collect())
    }

    pub async fn settlement_rows(&self, group_id: GroupId) -> Result<Vec<SettlementRow>> {
        let names = self.service.member_names(group_id).await?;
        let settlements = self.service.get_settlements(group_id).await?;

        Ok(settlements
            .iter()
            .map(|s| SettlementRow {
                from_member_id: s.from_member_id,
                to_member_id: s.to_member_id,
                from_name: display_name(&names, s.from_member_id),
                to_name: display_name(&names, s.to_member_id),
                amount: s.amount,
            })
            .collect())
    }

    /// Export balances, returning the number of rows written
    pub async fn export_balances<W: Write>(
        &self,
        group_id: GroupId,
        format: ExportFormat,
        writer: W,
    ) -> Result<usize> {
        let rows = self.balance_rows(group_id).await?;
        write_rows(&rows, format, writer)?;
        Ok(rows.len())
    }

    /// Export the settlement plan, returning the number of rows written
    pub async fn export_settlements<W: Write>(
        &self,
        group_id: GroupId,
        format: ExportFormat,
        writer: W,
    ) -> Result<usize> {
        let rows = self.settlement_rows(group_id).await?;
        write_rows(&rows, format, writer)?;
        Ok(rows.len())
    }
}

fn display_name(names: &HashMap<MemberId, String>, id: MemberId) -> String {
    names.get(&id).cloned().unwrap_or_else(|| id.to_string())
}

fn write_rows<T: Serialize, W: Write>(rows: &[T], format: ExportFormat, mut writer: W) -> Result<()> {
    match format {
        ExportFormat::Csv => {
            let mut csv_writer = csv::Writer::from_writer(writer);
            for row in rows {
                csv_writer.serialize(row)?;
            }
            csv_writer.flush()?;
        }
        ExportFormat::Json => {
            let json = serde_json::to_string_pretty(rows)?;
            writer.write_all(json.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BillDraft, Share};

    #[test]
    fn test_parse_format() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }

    #[tokio::test]
    async fn test_export_settlements_csv() -> Result<()> {
        let service = LedgerService::in_memory();
        let group = service.create_group("Trip".into(), "EUR".into()).await?;
        let alice = service.add_member(group.id, "Alice".into()).await?;
        let bob = service.add_member(group.id, "Bob".into()).await?;
        service
            .create_bill(
                group.id,
                BillDraft::new(alice.id, 1250, vec![Share::new(bob.id, 1250)]),
            )
            .await?;

        let mut out = Vec::new();
        let count = Exporter::new(&service)
            .export_settlements(group.id, ExportFormat::Csv, &mut out)
            .await?;

        assert_eq!(count, 1);
        let text = String::from_utf8(out)?;
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("fromMemberId,toMemberId,fromName,toName,amount"));
        assert_eq!(
            lines.next(),
            Some(format!("{},{},Bob,Alice,1250", bob.id, alice.id).as_str())
        );
        assert_eq!(lines.next(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_export_balances_json() -> Result<()> {
        let service = LedgerService::in_memory();
        let group = service.create_group("Trip".into(), "EUR".into()).await?;
        let alice = service.add_member(group.id, "Alice".into()).await?;
        let bob = service.add_member(group.id, "Bob".into()).await?;
        service
            .create_bill(
                group.id,
                BillDraft::new(alice.id, 999, vec![Share::new(bob.id, 999)]),
            )
            .await?;

        let mut out = Vec::new();
        Exporter::new(&service)
            .export_balances(group.id, ExportFormat::Json, &mut out)
            .await?;

        let value: serde_json::Value = serde_json::from_slice(&out)?;
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        let alice_row = rows
            .iter()
            .find(|r| r["memberId"] == alice.id.to_string())
            .unwrap();
        assert_eq!(
            *alice_row,
            serde_json::json!({
                "memberId": alice.id.to_string(),
                "memberName": "Alice",
                "amount": 999
            })
        );
        Ok(())
    }
}
