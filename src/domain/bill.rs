use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{Cents, GroupId, MemberId, SplitError, split_evenly, split_weighted};

pub type BillId = Uuid;

/// One participant's obligation for a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub member_id: MemberId,
    /// Amount owed in cents (never negative)
    pub amount: Cents,
}

impl Share {
    pub fn new(member_id: MemberId, amount: Cents) -> Self {
        Self { member_id, amount }
    }
}

/// A shared expense paid by one member and owed by the members holding shares.
/// The payer may hold a share too; that part nets out in the balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub group_id: GroupId,
    pub payer: MemberId,
    /// Total in cents; always equals the sum of `shares`
    pub total_cents: Cents,
    /// Shares in a stable order (split remainders land on the first ones)
    pub shares: Vec<Share>,
    /// When the expense happened
    pub timestamp: DateTime<Utc>,
    /// When the bill was recorded in the ledger
    pub recorded_at: DateTime<Utc>,
    pub description: Option<String>,
}

/// The caller-supplied part of a bill, before it gets an id and a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillDraft {
    pub payer: MemberId,
    pub total_cents: Cents,
    pub shares: Vec<Share>,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
}

impl BillDraft {
    pub fn new(payer: MemberId, total_cents: Cents, shares: Vec<Share>) -> Self {
        Self {
            payer,
            total_cents,
            shares,
            timestamp: Utc::now(),
            description: None,
        }
    }

    /// Split `total_cents` evenly between `participants`, extra cents to the first ones.
    pub fn split_evenly(
        payer: MemberId,
        total_cents: Cents,
        participants: &[MemberId],
    ) -> Result<Self, ValidationError> {
        let amounts = split_evenly(total_cents, participants.len())?;
        Ok(Self::new(payer, total_cents, zip_shares(participants, amounts)))
    }

    /// Split `total_cents` proportionally to integer weights.
    pub fn split_weighted(
        payer: MemberId,
        total_cents: Cents,
        weights: &[(MemberId, u32)],
    ) -> Result<Self, ValidationError> {
        let members: Vec<MemberId> = weights.iter().map(|(id, _)| *id).collect();
        let raw: Vec<u32> = weights.iter().map(|(_, w)| *w).collect();
        let amounts = split_weighted(total_cents, &raw)?;
        Ok(Self::new(payer, total_cents, zip_shares(&members, amounts)))
    }

    /// A repayment: `from` paid `to` directly. Modelled as a bill paid by
    /// `from` and owed entirely by `to`, so it moves both balances toward zero.
    pub fn repayment(from: MemberId, to: MemberId, amount: Cents) -> Self {
        Self::new(from, amount, vec![Share::new(to, amount)]).with_description("Repayment")
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Turn the draft into a bill with a fresh id.
    pub fn into_bill(self, group_id: GroupId) -> Bill {
        self.into_bill_with_id(Uuid::new_v4(), group_id)
    }

    pub fn into_bill_with_id(self, id: BillId, group_id: GroupId) -> Bill {
        Bill {
            id,
            group_id,
            payer: self.payer,
            total_cents: self.total_cents,
            shares: self.shares,
            timestamp: self.timestamp,
            recorded_at: Utc::now(),
            description: self.description,
        }
    }
}

fn zip_shares(members: &[MemberId], amounts: Vec<Cents>) -> Vec<Share> {
    members
        .iter()
        .zip(amounts)
        .map(|(&member_id, amount)| Share::new(member_id, amount))
        .collect()
}

impl Bill {
    /// Sum of all share amounts, or `None` on overflow.
    pub fn share_sum(&self) -> Option<Cents> {
        self.shares
            .iter()
            .try_fold(0 as Cents, |acc, share| acc.checked_add(share.amount))
    }

    /// Every member the bill touches: the payer followed by share holders.
    pub fn participants(&self) -> impl Iterator<Item = MemberId> + '_ {
        std::iter::once(self.payer).chain(self.shares.iter().map(|s| s.member_id))
    }

    pub fn involves(&self, member_id: MemberId) -> bool {
        self.participants().any(|id| id == member_id)
    }

    /// Checks that only depend on the bill itself: non-negative amounts, at
    /// least one share, no member listed twice, shares summing to the total.
    pub fn validate_amounts(&self) -> Result<(), ValidationError> {
        if self.total_cents < 0 {
            return Err(ValidationError::NegativeAmount(self.total_cents));
        }
        if self.shares.is_empty() {
            return Err(ValidationError::NoShares);
        }
        for (i, share) in self.shares.iter().enumerate() {
            if share.amount < 0 {
                return Err(ValidationError::NegativeAmount(share.amount));
            }
            if self.shares[..i].iter().any(|s| s.member_id == share.member_id) {
                return Err(ValidationError::DuplicateShare(share.member_id));
            }
        }

        let share_sum = self.share_sum().ok_or(ValidationError::Overflow)?;
        if share_sum != self.total_cents {
            return Err(ValidationError::ShareSumMismatch {
                total: self.total_cents,
                share_sum,
            });
        }
        Ok(())
    }
}

/// A bill or member change that is rejected before it reaches the ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Shares sum to {share_sum} cents but the bill total is {total} cents")]
    ShareSumMismatch { total: Cents, share_sum: Cents },

    #[error("Amounts must not be negative (got {0} cents)")]
    NegativeAmount(Cents),

    #[error("A bill needs at least one share")]
    NoShares,

    #[error("Member {0} appears more than once in the shares")]
    DuplicateShare(MemberId),

    #[error("Member {0} is not part of this group")]
    UnknownMember(MemberId),

    #[error("Bill belongs to group {bill_group}, not {group}")]
    WrongGroup { bill_group: GroupId, group: GroupId },

    #[error("Bill already exists: {0}")]
    DuplicateBill(BillId),

    #[error("Amount overflow")]
    Overflow,

    #[error("Member {member_id} still appears in {bills} bill(s)")]
    MemberReferenced { member_id: MemberId, bills: usize },

    #[error("Member {member_id} has an outstanding balance of {balance} cents")]
    MemberHasBalance { member_id: MemberId, balance: Cents },

    #[error("A payment must be for a positive amount")]
    NonPositivePayment,

    #[error("Member {0} cannot pay themselves")]
    SelfPayment(MemberId),

    #[error(transparent)]
    Split(#[from] SplitError),
}
