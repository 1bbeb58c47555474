use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::{
    Balance, Bill, BillDraft, BillId, Cents, Group, GroupId, IntegrityReport, Member, MemberId,
    Settlement, ValidationError, build_integrity_report,
};
use crate::storage::{BillStore, MemoryStore, Repository};

use super::cache::{GroupSlot, GroupState, LedgerSnapshot};
use super::AppError;

/// Application service providing high-level operations for group ledgers.
/// This is the primary interface for any client (CLI, API, etc.).
///
/// Each group has its own locks: reads and in-memory changes of one group are
/// serialized, and so are its store writes. Different groups never wait on
/// each other. Balances and settlements are computed lazily on the first read
/// after a change and cached until the next one.
pub struct LedgerService {
    store: Arc<dyn BillStore>,
    groups: RwLock<HashMap<GroupId, Arc<GroupSlot>>>,
}

impl LedgerService {
    /// Create a new ledger service on top of the given store.
    pub fn new(store: Arc<dyn BillStore>) -> Self {
        Self {
            store,
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// A service whose data lives only in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(Arc::new(repo)))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(Arc::new(repo)))
    }

    /// The per-group slot, registering the group on first use.
    async fn group_slot(&self, group_id: GroupId) -> Result<Arc<GroupSlot>, AppError> {
        if let Some(slot) = self.groups.read().await.get(&group_id) {
            return Ok(Arc::clone(slot));
        }

        let group = self
            .store
            .get_group(group_id)
            .await?
            .ok_or_else(|| AppError::GroupNotFound(group_id.to_string()))?;

        let mut groups = self.groups.write().await;
        let slot = groups
            .entry(group_id)
            .or_insert_with(|| Arc::new(GroupSlot::new(GroupState::unloaded(group))));
        Ok(Arc::clone(slot))
    }

    /// Handle the outcome of a store write made after the in-memory change.
    /// Must be called with the slot's `writes` lock held. On failure the
    /// group's ledger is dropped so it gets reloaded from the store, which
    /// stays the source of truth.
    async fn persisted(
        &self,
        group_id: GroupId,
        slot: &GroupSlot,
        result: anyhow::Result<()>,
    ) -> Result<(), AppError> {
        if let Err(err) = result {
            tracing::error!("failed to persist change to group {group_id}: {err:#}");
            slot.state.lock().await.discard();
            return Err(AppError::Storage(err));
        }
        Ok(())
    }

    // ========================
    // Group operations
    // ========================

    /// Create a new, empty group.
    pub async fn create_group(&self, name: String, currency: String) -> Result<Group, AppError> {
        if self.store.find_group_by_name(&name).await?.is_some() {
            return Err(AppError::GroupAlreadyExists(name));
        }

        let group = Group::new(name, currency);
        if let Err(err) = self.store.save_group(&group).await {
            // Lost a race with another create of the same name
            if self.store.find_group_by_name(&group.name).await?.is_some() {
                return Err(AppError::GroupAlreadyExists(group.name));
            }
            return Err(err.into());
        }
        self.groups.write().await.insert(
            group.id,
            Arc::new(GroupSlot::new(GroupState::empty(group.clone()))),
        );

        tracing::info!("created group {} ({})", group.name, group.id);
        Ok(group)
    }

    pub async fn get_group(&self, group_id: GroupId) -> Result<Group, AppError> {
        self.store
            .get_group(group_id)
            .await?
            .ok_or_else(|| AppError::GroupNotFound(group_id.to_string()))
    }

    /// Get a group by name.
    pub async fn find_group(&self, name: &str) -> Result<Group, AppError> {
        self.store
            .find_group_by_name(name)
            .await?
            .ok_or_else(|| AppError::GroupNotFound(name.to_string()))
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        Ok(self.store.list_groups().await?)
    }

    // ========================
    // Member operations
    // ========================

    pub async fn add_member(&self, group_id: GroupId, name: String) -> Result<Member, AppError> {
        let slot = self.group_slot(group_id).await?;
        let _writes = slot.writes.lock().await;
        let member = {
            let mut guard = slot.state.lock().await;
            let member = Member::new(group_id, name);
            guard
                .ledger(self.store.as_ref())
                .await?
                .add_member(member.clone())?;
            guard.touch();
            member
        };

        let result = self.store.save_member(&member).await;
        self.persisted(group_id, &slot, result).await?;

        tracing::info!("added member {} to group {group_id}", member.name);
        Ok(member)
    }

    /// Remove a member. Only allowed once the member is settled and no bill
    /// mentions them.
    pub async fn remove_member(
        &self,
        group_id: GroupId,
        member_id: MemberId,
    ) -> Result<Member, AppError> {
        let slot = self.group_slot(group_id).await?;
        let _writes = slot.writes.lock().await;
        let member = {
            let mut guard = slot.state.lock().await;
            let member = guard
                .ledger(self.store.as_ref())
                .await?
                .remove_member(member_id)?;
            guard.touch();
            member
        };

        let result = self.store.delete_member(member_id).await;
        self.persisted(group_id, &slot, result).await?;

        tracing::info!("removed member {} from group {group_id}", member.name);
        Ok(member)
    }

    /// Members of a group, ordered by name.
    pub async fn list_members(&self, group_id: GroupId) -> Result<Vec<Member>, AppError> {
        let slot = self.group_slot(group_id).await?;
        let mut guard = slot.state.lock().await;
        let mut members: Vec<Member> = guard
            .ledger(self.store.as_ref())
            .await?
            .members()
            .cloned()
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    /// Get a group member by name.
    pub async fn find_member(&self, group_id: GroupId, name: &str) -> Result<Member, AppError> {
        let slot = self.group_slot(group_id).await?;
        let mut guard = slot.state.lock().await;
        guard
            .ledger(self.store.as_ref())
            .await?
            .member_by_name(name)
            .cloned()
            .ok_or_else(|| AppError::MemberNotFound(name.to_string()))
    }

    // ========================
    // Bill operations
    // ========================

    /// Record a new bill in a group.
    pub async fn create_bill(&self, group_id: GroupId, draft: BillDraft) -> Result<Bill, AppError> {
        let slot = self.group_slot(group_id).await?;
        let _writes = slot.writes.lock().await;
        let bill = {
            let mut guard = slot.state.lock().await;
            let bill = draft.into_bill(group_id);
            guard
                .ledger(self.store.as_ref())
                .await?
                .add_bill(bill.clone())?;
            guard.touch();
            bill
        };

        let result = self.store.save_bill(&bill).await;
        self.persisted(group_id, &slot, result).await?;

        tracing::info!(
            "recorded bill {} in group {group_id}: {} cents, {} shares",
            bill.id,
            bill.total_cents,
            bill.shares.len()
        );
        Ok(bill)
    }

    /// Replace the payer, amount and shares of an existing bill.
    pub async fn update_bill(&self, bill_id: BillId, draft: BillDraft) -> Result<Bill, AppError> {
        let group_id = self.bill_group(bill_id).await?;
        let slot = self.group_slot(group_id).await?;
        let _writes = slot.writes.lock().await;
        let bill = {
            let mut guard = slot.state.lock().await;
            let ledger = guard.ledger(self.store.as_ref()).await?;
            ledger.replace_bill(draft.into_bill_with_id(bill_id, group_id))?;
            let bill = ledger
                .bill(bill_id)
                .cloned()
                .ok_or_else(|| AppError::BillNotFound(bill_id.to_string()))?;
            guard.touch();
            bill
        };

        let result = self.store.save_bill(&bill).await;
        self.persisted(group_id, &slot, result).await?;

        tracing::info!("updated bill {bill_id} in group {group_id}");
        Ok(bill)
    }

    pub async fn delete_bill(&self, bill_id: BillId) -> Result<Bill, AppError> {
        let group_id = self.bill_group(bill_id).await?;
        let slot = self.group_slot(group_id).await?;
        let _writes = slot.writes.lock().await;
        let bill = {
            let mut guard = slot.state.lock().await;
            let bill = guard
                .ledger(self.store.as_ref())
                .await?
                .remove_bill(bill_id)?;
            guard.touch();
            bill
        };

        let result = self.store.delete_bill(bill_id).await;
        self.persisted(group_id, &slot, result).await?;

        tracing::info!("deleted bill {bill_id} from group {group_id}");
        Ok(bill)
    }

    /// Record that `from` paid `to` back directly.
    pub async fn record_payment(
        &self,
        group_id: GroupId,
        from: MemberId,
        to: MemberId,
        amount_cents: Cents,
    ) -> Result<Bill, AppError> {
        if amount_cents <= 0 {
            return Err(ValidationError::NonPositivePayment.into());
        }
        if from == to {
            return Err(ValidationError::SelfPayment(from).into());
        }
        self.create_bill(group_id, BillDraft::repayment(from, to, amount_cents))
            .await
    }

    pub async fn get_bill(&self, bill_id: BillId) -> Result<Bill, AppError> {
        let group_id = self.bill_group(bill_id).await?;
        let slot = self.group_slot(group_id).await?;
        let mut guard = slot.state.lock().await;
        guard
            .ledger(self.store.as_ref())
            .await?
            .bill(bill_id)
            .cloned()
            .ok_or_else(|| AppError::BillNotFound(bill_id.to_string()))
    }

    /// Bills of a group, oldest first.
    pub async fn list_bills(&self, group_id: GroupId) -> Result<Vec<Bill>, AppError> {
        let slot = self.group_slot(group_id).await?;
        let mut guard = slot.state.lock().await;
        let mut bills = guard.ledger(self.store.as_ref()).await?.bills().to_vec();
        bills.sort_by_key(|b| (b.timestamp, b.recorded_at));
        Ok(bills)
    }

    async fn bill_group(&self, bill_id: BillId) -> Result<GroupId, AppError> {
        self.store
            .find_bill_group(bill_id)
            .await?
            .ok_or_else(|| AppError::BillNotFound(bill_id.to_string()))
    }

    // ========================
    // Balances and settlements
    // ========================

    /// Balances and settlements of a group, computed at most once per revision.
    pub async fn snapshot(&self, group_id: GroupId) -> Result<Arc<LedgerSnapshot>, AppError> {
        let slot = self.group_slot(group_id).await?;
        let mut guard = slot.state.lock().await;
        guard.snapshot(self.store.as_ref()).await
    }

    /// Net balance of every member, ordered by member id.
    pub async fn get_balances(&self, group_id: GroupId) -> Result<Vec<Balance>, AppError> {
        Ok(self.snapshot(group_id).await?.balances.clone())
    }

    /// Transfers that settle every balance of the group.
    pub async fn get_settlements(&self, group_id: GroupId) -> Result<Vec<Settlement>, AppError> {
        Ok(self.snapshot(group_id).await?.settlements.clone())
    }

    /// Current revision of a group. Grows whenever its bills or members
    /// change. Only comparable within this service instance: a new instance
    /// starts every group again at 0.
    pub async fn revision(&self, group_id: GroupId) -> Result<u64, AppError> {
        let slot = self.group_slot(group_id).await?;
        let revision = slot.state.lock().await.revision();
        Ok(revision)
    }

    /// Notification that the group's data changed in the store behind the
    /// service's back. Nothing is recomputed until the next read.
    pub async fn on_bill_changed(&self, group_id: GroupId) -> Result<(), AppError> {
        let slot = self.group_slot(group_id).await?;
        // Wait for in-flight writes so the reload sees them
        let _writes = slot.writes.lock().await;
        slot.state.lock().await.discard();
        tracing::debug!("group {group_id} invalidated by external change");
        Ok(())
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check a group's ledger and return a report. Unlike the balance reads
    /// this never fails on inconsistent data; it lists the problems instead.
    pub async fn check_integrity(&self, group_id: GroupId) -> Result<IntegrityReport, AppError> {
        let slot = self.group_slot(group_id).await?;
        let mut guard = slot.state.lock().await;
        let ledger = guard.ledger(self.store.as_ref()).await?;
        Ok(build_integrity_report(ledger))
    }

    /// Map of member ids to names for a group (useful for display).
    pub async fn member_names(&self, group_id: GroupId) -> Result<HashMap<MemberId, String>, AppError> {
        Ok(self
            .list_members(group_id)
            .await?
            .into_iter()
            .map(|m| (m.id, m.name))
            .collect())
    }
}
