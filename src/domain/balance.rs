use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Bill, Cents, GroupId, GroupLedger, IntegrityError, MemberId};

/// Net position of one member in a group.
/// Positive: the member is owed money. Negative: the member owes money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub member_id: MemberId,
    #[serde(skip)]
    pub group_id: GroupId,
    pub amount: Cents,
}

/// Net amount for a single member across `bills`.
pub fn net_amount(member_id: MemberId, bills: &[Bill]) -> Cents {
    bills.iter().fold(0, |balance, bill| {
        let credit = if bill.payer == member_id {
            bill.total_cents
        } else {
            0
        };
        let debit: Cents = bill
            .shares
            .iter()
            .filter(|s| s.member_id == member_id)
            .fold(0, |acc: Cents, s| acc.saturating_add(s.amount));
        balance.saturating_add(credit).saturating_sub(debit)
    })
}

/// Credit each payer with the bill total and debit each share holder.
/// Returns every member touched by any bill, known to the group or not.
pub fn net_positions(bills: &[Bill]) -> Result<BTreeMap<MemberId, Cents>, IntegrityError> {
    let mut positions: BTreeMap<MemberId, Cents> = BTreeMap::new();

    for bill in bills {
        apply(&mut positions, bill.payer, bill.total_cents, bill.group_id)?;
        for share in &bill.shares {
            let debit = share
                .amount
                .checked_neg()
                .ok_or(IntegrityError::Overflow(bill.group_id))?;
            apply(&mut positions, share.member_id, debit, bill.group_id)?;
        }
    }

    Ok(positions)
}

fn apply(
    positions: &mut BTreeMap<MemberId, Cents>,
    member_id: MemberId,
    delta: Cents,
    group_id: GroupId,
) -> Result<(), IntegrityError> {
    let entry = positions.entry(member_id).or_insert(0);
    *entry = entry
        .checked_add(delta)
        .ok_or(IntegrityError::Overflow(group_id))?;
    Ok(())
}

/// Compute the balance of every member of the group, ordered by member id.
///
/// Members with no bills get a zero balance. Members that are no longer part
/// of the group are dropped if they net to zero; a nonzero balance for one of
/// them, or balances that don't sum to zero, is an integrity error.
pub fn compute_balances(ledger: &GroupLedger) -> Result<Vec<Balance>, IntegrityError> {
    let group_id = ledger.group_id();
    let mut positions = net_positions(ledger.bills())?;

    let sum: i128 = positions.values().map(|&amount| i128::from(amount)).sum();
    if sum != 0 {
        return Err(IntegrityError::ConservationViolated { group_id, sum });
    }

    if let Some((&member_id, &amount)) = positions
        .iter()
        .find(|(id, amount)| **amount != 0 && !ledger.is_member(**id))
    {
        return Err(IntegrityError::RemovedMemberBalance { member_id, amount });
    }

    Ok(ledger
        .members()
        .map(|member| Balance {
            member_id: member.id,
            group_id,
            amount: positions.remove(&member.id).unwrap_or(0),
        })
        .collect())
}
