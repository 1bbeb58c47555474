use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{Bill, BillId, Group, GroupId, Member, MemberId, Share};

use super::{BillStore, MIGRATION_001_INITIAL};

/// SQLite-backed store for groups, members and bills.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run more than once.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    fn row_to_group(row: &sqlx::sqlite::SqliteRow) -> Result<Group> {
        Ok(Group {
            id: parse_uuid(row, "id")?,
            name: row.get("name"),
            currency: row.get("currency"),
            created_at: parse_timestamp(row, "created_at")?,
        })
    }

    fn row_to_member(row: &sqlx::sqlite::SqliteRow) -> Result<Member> {
        Ok(Member {
            id: parse_uuid(row, "id")?,
            group_id: parse_uuid(row, "group_id")?,
            name: row.get("name"),
            joined_at: parse_timestamp(row, "joined_at")?,
        })
    }

    fn row_to_bill(row: &sqlx::sqlite::SqliteRow, shares: Vec<Share>) -> Result<Bill> {
        Ok(Bill {
            id: parse_uuid(row, "id")?,
            group_id: parse_uuid(row, "group_id")?,
            payer: parse_uuid(row, "payer_id")?,
            total_cents: row.get("total_cents"),
            shares,
            timestamp: parse_timestamp(row, "timestamp")?,
            recorded_at: parse_timestamp(row, "recorded_at")?,
            description: row.get("description"),
        })
    }
}

fn parse_uuid(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<Uuid> {
    let raw: String = row.get(column);
    Uuid::parse_str(&raw).with_context(|| format!("Invalid UUID in column {}", column))
}

fn parse_timestamp(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.get(column);
    Ok(DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("Invalid timestamp in column {}", column))?
        .with_timezone(&Utc))
}

#[async_trait]
impl BillStore for Repository {
    async fn save_group(&self, group: &Group) -> Result<()> {
        sqlx::query("INSERT INTO groups (id, name, currency, created_at) VALUES (?, ?, ?, ?)")
            .bind(group.id.to_string())
            .bind(&group.name)
            .bind(&group.currency)
            .bind(group.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to save group")?;
        Ok(())
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT id, name, currency, created_at FROM groups WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch group")?;

        row.as_ref().map(Self::row_to_group).transpose()
    }

    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT id, name, currency, created_at FROM groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch group by name")?;

        row.as_ref().map(Self::row_to_group).transpose()
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query("SELECT id, name, currency, created_at FROM groups ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list groups")?;

        rows.iter().map(Self::row_to_group).collect()
    }

    async fn save_member(&self, member: &Member) -> Result<()> {
        sqlx::query("INSERT INTO members (id, group_id, name, joined_at) VALUES (?, ?, ?, ?)")
            .bind(member.id.to_string())
            .bind(member.group_id.to_string())
            .bind(&member.name)
            .bind(member.joined_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("Failed to save member")?;
        Ok(())
    }

    async fn delete_member(&self, id: MemberId) -> Result<()> {
        sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete member")?;
        Ok(())
    }

    async fn load_members(&self, group_id: GroupId) -> Result<Vec<Member>> {
        let rows = sqlx::query(
            "SELECT id, group_id, name, joined_at FROM members WHERE group_id = ? ORDER BY name",
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load members")?;

        rows.iter().map(Self::row_to_member).collect()
    }

    async fn save_bill(&self, bill: &Bill) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        sqlx::query(
            r#"
            INSERT INTO bills (id, group_id, payer_id, total_cents, timestamp, recorded_at, description)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                payer_id = excluded.payer_id,
                total_cents = excluded.total_cents,
                timestamp = excluded.timestamp,
                recorded_at = excluded.recorded_at,
                description = excluded.description
            "#,
        )
        .bind(bill.id.to_string())
        .bind(bill.group_id.to_string())
        .bind(bill.payer.to_string())
        .bind(bill.total_cents)
        .bind(bill.timestamp.to_rfc3339())
        .bind(bill.recorded_at.to_rfc3339())
        .bind(&bill.description)
        .execute(&mut *tx)
        .await
        .context("Failed to save bill")?;

        sqlx::query("DELETE FROM shares WHERE bill_id = ?")
            .bind(bill.id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to clear bill shares")?;

        for (position, share) in bill.shares.iter().enumerate() {
            sqlx::query(
                "INSERT INTO shares (bill_id, position, member_id, amount_cents) VALUES (?, ?, ?, ?)",
            )
            .bind(bill.id.to_string())
            .bind(position as i64)
            .bind(share.member_id.to_string())
            .bind(share.amount)
            .execute(&mut *tx)
            .await
            .context("Failed to save share")?;
        }

        tx.commit().await.context("Failed to commit bill")?;
        Ok(())
    }

    async fn delete_bill(&self, id: BillId) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;

        sqlx::query("DELETE FROM shares WHERE bill_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to delete bill shares")?;
        sqlx::query("DELETE FROM bills WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to delete bill")?;

        tx.commit().await.context("Failed to commit bill deletion")?;
        Ok(())
    }

    async fn load_bills(&self, group_id: GroupId) -> Result<Vec<Bill>> {
        let share_rows = sqlx::query(
            r#"
            SELECT s.bill_id, s.member_id, s.amount_cents
            FROM shares s
            JOIN bills b ON b.id = s.bill_id
            WHERE b.group_id = ?
            ORDER BY s.bill_id, s.position
            "#,
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load shares")?;

        let mut shares: HashMap<BillId, Vec<Share>> = HashMap::new();
        for row in &share_rows {
            shares
                .entry(parse_uuid(row, "bill_id")?)
                .or_default()
                .push(Share::new(parse_uuid(row, "member_id")?, row.get("amount_cents")));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, group_id, payer_id, total_cents, timestamp, recorded_at, description
            FROM bills
            WHERE group_id = ?
            ORDER BY timestamp, recorded_at
            "#,
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load bills")?;

        rows.iter()
            .map(|row| {
                let id = parse_uuid(row, "id")?;
                Self::row_to_bill(row, shares.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn find_bill_group(&self, id: BillId) -> Result<Option<GroupId>> {
        let row = sqlx::query("SELECT group_id FROM bills WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up bill")?;

        row.as_ref().map(|r| parse_uuid(r, "group_id")).transpose()
    }
}
