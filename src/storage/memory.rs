use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Bill, BillId, Group, GroupId, Member, MemberId};

use super::BillStore;

/// Store that keeps everything in process memory. Used for tests and for
/// running the service without a database file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    groups: HashMap<GroupId, Group>,
    members: HashMap<MemberId, Member>,
    /// Insertion order
    bills: Vec<Bill>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillStore for MemoryStore {
    async fn save_group(&self, group: &Group) -> Result<()> {
        let mut state = self.state.write().await;
        if state.groups.values().any(|g| g.name == group.name) {
            anyhow::bail!("Group name already taken: {}", group.name);
        }
        state.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>> {
        Ok(self.state.read().await.groups.get(&id).cloned())
    }

    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let state = self.state.read().await;
        Ok(state.groups.values().find(|g| g.name == name).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let mut groups: Vec<Group> = self.state.read().await.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn save_member(&self, member: &Member) -> Result<()> {
        self.state
            .write()
            .await
            .members
            .insert(member.id, member.clone());
        Ok(())
    }

    async fn delete_member(&self, id: MemberId) -> Result<()> {
        self.state.write().await.members.remove(&id);
        Ok(())
    }

    async fn load_members(&self, group_id: GroupId) -> Result<Vec<Member>> {
        let state = self.state.read().await;
        let mut members: Vec<Member> = state
            .members
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    async fn save_bill(&self, bill: &Bill) -> Result<()> {
        let mut state = self.state.write().await;
        match state.bills.iter_mut().find(|b| b.id == bill.id) {
            Some(existing) => *existing = bill.clone(),
            None => state.bills.push(bill.clone()),
        }
        Ok(())
    }

    async fn delete_bill(&self, id: BillId) -> Result<()> {
        self.state.write().await.bills.retain(|b| b.id != id);
        Ok(())
    }

    async fn load_bills(&self, group_id: GroupId) -> Result<Vec<Bill>> {
        let state = self.state.read().await;
        Ok(state
            .bills
            .iter()
            .filter(|b| b.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn find_bill_group(&self, id: BillId) -> Result<Option<GroupId>> {
        let state = self.state.read().await;
        Ok(state.bills.iter().find(|b| b.id == id).map(|b| b.group_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BillDraft, Share};

    #[tokio::test]
    async fn test_save_bill_replaces_existing() -> Result<()> {
        let store = MemoryStore::new();
        let group = Group::new("Trip", "EUR");
        store.save_group(&group).await?;
        let member = Member::new(group.id, "A");
        store.save_member(&member).await?;

        let bill =
            BillDraft::new(member.id, 100, vec![Share::new(member.id, 100)]).into_bill(group.id);
        store.save_bill(&bill).await?;

        let updated = BillDraft::new(member.id, 250, vec![Share::new(member.id, 250)])
            .into_bill_with_id(bill.id, group.id);
        store.save_bill(&updated).await?;

        let bills = store.load_bills(group.id).await?;
        assert_eq!(bills, vec![updated]);
        assert_eq!(store.find_bill_group(bill.id).await?, Some(group.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_group_names_are_unique() -> Result<()> {
        let store = MemoryStore::new();
        store.save_group(&Group::new("Trip", "EUR")).await?;
        assert!(store.save_group(&Group::new("Trip", "USD")).await.is_err());
        Ok(())
    }
}
