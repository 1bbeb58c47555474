use serde::Serialize;
use thiserror::Error;

use super::{
    Cents, GroupId, GroupLedger, MemberId, Settlement, compute_balances, net_positions,
    plan_settlements, verify_plan,
};

/// The ledger contradicts itself. Never repaired automatically: a group in
/// this state must not serve balances until its data is fixed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Balances of group {group_id} sum to {sum} cents instead of zero")]
    ConservationViolated { group_id: GroupId, sum: i128 },

    #[error("Member {member_id} is no longer in the group but has a balance of {amount} cents")]
    RemovedMemberBalance { member_id: MemberId, amount: Cents },

    #[error("Balance overflow in group {0}")]
    Overflow(GroupId),

    #[error("Settlement plan leaves member {member_id} at {remaining} cents")]
    UnsettledBalance { member_id: MemberId, remaining: Cents },

    #[error("Invalid settlement {0}")]
    InvalidSettlement(Settlement),

    #[error("More than one settlement from {from} to {to}")]
    DuplicateSettlementPair { from: MemberId, to: MemberId },
}

/// Diagnostic summary of a group's ledger. Unlike the balance calculator it
/// never fails; every problem found becomes an entry in `issues`.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub group_id: GroupId,
    pub member_count: usize,
    pub bill_count: usize,
    /// Sum of every net position, including former members
    pub balance_sum: i128,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_balanced(&self) -> bool {
        self.balance_sum == 0
    }

    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn build_integrity_report(ledger: &GroupLedger) -> IntegrityReport {
    let mut issues = Vec::new();

    for bill in ledger.bills() {
        if let Err(err) = bill.validate_amounts() {
            issues.push(format!("Bill {}: {}", bill.id, err));
        }
        if bill.group_id != ledger.group_id() {
            issues.push(format!(
                "Bill {}: belongs to group {}",
                bill.id, bill.group_id
            ));
        }
    }

    let balance_sum = match net_positions(ledger.bills()) {
        Ok(positions) => positions.values().map(|&a| i128::from(a)).sum(),
        Err(err) => {
            issues.push(err.to_string());
            0
        }
    };

    match compute_balances(ledger) {
        Ok(balances) => {
            let plan = plan_settlements(&balances);
            if let Err(err) = verify_plan(&balances, &plan) {
                issues.push(err.to_string());
            }
        }
        // Overflow was already reported above.
        Err(IntegrityError::Overflow(_)) => {}
        Err(err) => issues.push(err.to_string()),
    }

    IntegrityReport {
        group_id: ledger.group_id(),
        member_count: ledger.members().count(),
        bill_count: ledger.bills().len(),
        balance_sum,
        issues,
    }
}
