use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::{
    Balance, Group, GroupId, GroupLedger, IntegrityError, Settlement, compute_balances,
    plan_settlements, verify_plan,
};
use crate::storage::BillStore;

use super::AppError;

/// Balances and settlements of a group at one revision.
/// Shared behind an `Arc`; never mutated once built. `revision` orders
/// snapshots within one service instance only: it restarts at 0 when a new
/// service loads the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub group_id: GroupId,
    pub revision: u64,
    pub balances: Vec<Balance>,
    pub settlements: Vec<Settlement>,
}

impl LedgerSnapshot {
    /// Run the balance calculator and settlement planner over `ledger`.
    pub fn compute(ledger: &GroupLedger, revision: u64) -> Result<Self, IntegrityError> {
        let balances = compute_balances(ledger)?;
        let settlements = plan_settlements(&balances);
        verify_plan(&balances, &settlements)?;

        Ok(Self {
            group_id: ledger.group_id(),
            revision,
            balances,
            settlements,
        })
    }
}

/// Per-group locks held by the service.
///
/// `state` guards the in-memory ledger and is held only briefly. `writes` is
/// taken by every mutation before `state` and kept until its store write has
/// finished, so store writes land in the same order as the in-memory changes
/// and no reload can happen while a write is still in flight. Reads only take
/// `state`.
pub(crate) struct GroupSlot {
    pub(crate) state: Mutex<GroupState>,
    pub(crate) writes: Mutex<()>,
}

impl GroupSlot {
    pub(crate) fn new(state: GroupState) -> Self {
        Self {
            state: Mutex::new(state),
            writes: Mutex::new(()),
        }
    }
}

/// Everything the service tracks for one group. Always accessed under the
/// group's own lock.
pub(crate) struct GroupState {
    group: Group,
    /// `None` until loaded, and again after an external change or a failed write.
    ledger: Option<GroupLedger>,
    cache: Option<Arc<LedgerSnapshot>>,
    /// Starts at 0 when the service first sees the group; not persisted.
    revision: u64,
}

impl GroupState {
    /// State for a group whose ledger still has to be read from the store.
    pub(crate) fn unloaded(group: Group) -> Self {
        Self {
            group,
            ledger: None,
            cache: None,
            revision: 0,
        }
    }

    /// State for a freshly created, empty group.
    pub(crate) fn empty(group: Group) -> Self {
        let ledger = GroupLedger::new(group.clone());
        Self {
            group,
            ledger: Some(ledger),
            cache: None,
            revision: 0,
        }
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    /// The group's ledger, loading it from `store` first if needed.
    pub(crate) async fn ledger(
        &mut self,
        store: &dyn BillStore,
    ) -> Result<&mut GroupLedger, AppError> {
        let ledger = match self.ledger.take() {
            Some(ledger) => ledger,
            None => {
                let members = store.load_members(self.group.id).await?;
                let bills = store.load_bills(self.group.id).await?;
                tracing::debug!(
                    "loaded group {} from store: {} members, {} bills",
                    self.group.id,
                    members.len(),
                    bills.len()
                );
                GroupLedger::restore(self.group.clone(), members, bills)
            }
        };
        Ok(self.ledger.insert(ledger))
    }

    /// Record that the ledger changed: drop the cached results and bump the revision.
    pub(crate) fn touch(&mut self) {
        self.cache = None;
        self.revision += 1;
    }

    /// Forget the in-memory ledger so the next access reloads it from the store.
    pub(crate) fn discard(&mut self) {
        self.ledger = None;
        self.touch();
    }

    /// The cached snapshot, recomputing it if the ledger changed since.
    /// An integrity failure leaves the cache empty.
    pub(crate) async fn snapshot(
        &mut self,
        store: &dyn BillStore,
    ) -> Result<Arc<LedgerSnapshot>, AppError> {
        if let Some(cached) = &self.cache {
            return Ok(Arc::clone(cached));
        }

        let revision = self.revision;
        let group_id = self.group.id;
        let ledger = self.ledger(store).await?;
        match LedgerSnapshot::compute(ledger, revision) {
            Ok(snapshot) => {
                tracing::debug!("recomputed balances for group {group_id} at revision {revision}");
                let snapshot = Arc::new(snapshot);
                self.cache = Some(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(err) => {
                tracing::error!("integrity failure in group {group_id}: {err}");
                self.cache = None;
                Err(AppError::Integrity(err))
            }
        }
    }
}
