use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Balance, Cents, IntegrityError, MemberId, format_cents};

/// A proposed payment from a debtor to a creditor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub from_member_id: MemberId,
    pub to_member_id: MemberId,
    /// Always positive
    pub amount: Cents,
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: {}",
            self.from_member_id,
            self.to_member_id,
            format_cents(self.amount)
        )
    }
}

/// Max-heap keyed by outstanding amount; on equal amounts the smaller member
/// id comes out first. Amounts are magnitudes so a debt of `i64::MIN` fits.
type Queue = BinaryHeap<(u64, Reverse<MemberId>)>;

/// Produce transfers that bring every balance to zero.
///
/// Greedy matching: the largest remaining creditor is paid by the largest
/// remaining debtor, for the smaller of the two amounts. Every step settles at
/// least one side, so the plan has at most `nonzero members - 1` transfers.
/// This is not optimal for every distribution (that problem is NP-hard) but
/// matches it in the common cases.
///
/// Expects balances that sum to zero. Anything left over when one side runs
/// out is not planned; `verify_plan` reports it.
pub fn plan_settlements(balances: &[Balance]) -> Vec<Settlement> {
    let mut creditors = Queue::new();
    let mut debtors = Queue::new();
    for (member_id, amount) in merge_duplicates(balances) {
        if amount > 0 {
            creditors.push((amount.unsigned_abs(), Reverse(member_id)));
        } else if amount < 0 {
            debtors.push((amount.unsigned_abs(), Reverse(member_id)));
        }
    }

    let mut plan = Plan::default();
    while let (Some(&(credit, Reverse(creditor))), Some(&(debt, Reverse(debtor)))) =
        (creditors.peek(), debtors.peek())
    {
        creditors.pop();
        debtors.pop();

        let amount = credit.min(debt);
        // Bounded by a positive i64 credit.
        plan.push(debtor, creditor, amount as Cents);

        if credit > amount {
            creditors.push((credit - amount, Reverse(creditor)));
        }
        if debt > amount {
            debtors.push((debt - amount, Reverse(debtor)));
        }
    }

    plan.settlements
}

fn merge_duplicates(balances: &[Balance]) -> BTreeMap<MemberId, Cents> {
    let mut merged = BTreeMap::new();
    for balance in balances {
        let entry: &mut Cents = merged.entry(balance.member_id).or_insert(0);
        *entry = entry.saturating_add(balance.amount);
    }
    merged
}

/// Settlements in emission order, with transfers between the same ordered
/// pair folded into one.
#[derive(Default)]
struct Plan {
    settlements: Vec<Settlement>,
    index: HashMap<(MemberId, MemberId), usize>,
}

impl Plan {
    fn push(&mut self, from: MemberId, to: MemberId, amount: Cents) {
        match self.index.get(&(from, to)) {
            Some(&i) => self.settlements[i].amount += amount,
            None => {
                self.index.insert((from, to), self.settlements.len());
                self.settlements.push(Settlement {
                    from_member_id: from,
                    to_member_id: to,
                    amount,
                });
            }
        }
    }
}

/// Apply settlements to a balance vector: the payer's balance rises, the
/// receiver's falls. Members only named in settlements start at zero.
pub fn apply_settlements(
    balances: &[Balance],
    settlements: &[Settlement],
) -> BTreeMap<MemberId, Cents> {
    let mut remaining = merge_duplicates(balances);
    for s in settlements {
        let from = remaining.entry(s.from_member_id).or_insert(0);
        *from = from.saturating_add(s.amount);
        let to = remaining.entry(s.to_member_id).or_insert(0);
        *to = to.saturating_sub(s.amount);
    }
    remaining
}

/// Check that `settlements` is a well-formed plan that zeroes `balances`.
pub fn verify_plan(balances: &[Balance], settlements: &[Settlement]) -> Result<(), IntegrityError> {
    let mut pairs = HashMap::new();
    for s in settlements {
        if s.amount <= 0 || s.from_member_id == s.to_member_id {
            return Err(IntegrityError::InvalidSettlement(*s));
        }
        if pairs.insert((s.from_member_id, s.to_member_id), ()).is_some() {
            return Err(IntegrityError::DuplicateSettlementPair {
                from: s.from_member_id,
                to: s.to_member_id,
            });
        }
    }

    match apply_settlements(balances, settlements)
        .into_iter()
        .find(|(_, amount)| *amount != 0)
    {
        Some((member_id, remaining)) => Err(IntegrityError::UnsettledBalance {
            member_id,
            remaining,
        }),
        None => Ok(()),
    }
}
