mod memory;
mod repository;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::{Bill, BillId, Group, GroupId, Member, MemberId};

pub use memory::*;
pub use repository::*;

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Durable home of groups, members and bills.
///
/// The ledger service keeps its own in-memory copy of each group it has
/// touched; a store only has to persist what it is given and hand back the
/// authoritative lists when the service (re)loads a group.
#[async_trait]
pub trait BillStore: Send + Sync {
    async fn save_group(&self, group: &Group) -> Result<()>;

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>>;

    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>>;

    async fn list_groups(&self) -> Result<Vec<Group>>;

    async fn save_member(&self, member: &Member) -> Result<()>;

    async fn delete_member(&self, id: MemberId) -> Result<()>;

    async fn load_members(&self, group_id: GroupId) -> Result<Vec<Member>>;

    /// Insert or replace a bill together with its shares.
    async fn save_bill(&self, bill: &Bill) -> Result<()>;

    async fn delete_bill(&self, id: BillId) -> Result<()>;

    /// All bills of a group, oldest first.
    async fn load_bills(&self, group_id: GroupId) -> Result<Vec<Bill>>;

    /// The group a bill belongs to, if the bill exists.
    async fn find_bill_group(&self, id: BillId) -> Result<Option<GroupId>>;
}
