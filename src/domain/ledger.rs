use std::collections::BTreeMap;

use thiserror::Error;

use super::{Bill, BillId, Group, GroupId, Member, MemberId, ValidationError, net_amount};

/// In-memory ledger for one group: its members and bills.
///
/// Every bill accepted through `add_bill`/`replace_bill` references only
/// current members and has shares summing exactly to its total. Bills loaded
/// through `restore` are trusted as historical data; any inconsistency in them
/// is reported by the balance calculator instead.
#[derive(Debug, Clone)]
pub struct GroupLedger {
    group: Group,
    members: BTreeMap<MemberId, Member>,
    bills: Vec<Bill>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Bill not found: {0}")]
    BillNotFound(BillId),

    #[error("Member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("Member already exists in group: {0}")]
    MemberAlreadyExists(String),
}

impl GroupLedger {
    pub fn new(group: Group) -> Self {
        Self {
            group,
            members: BTreeMap::new(),
            bills: Vec::new(),
        }
    }

    /// Rebuild a ledger from stored members and bills without re-validating them.
    pub fn restore(group: Group, members: Vec<Member>, bills: Vec<Bill>) -> Self {
        Self {
            group,
            members: members.into_iter().map(|m| (m.id, m)).collect(),
            bills,
        }
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn group_id(&self) -> GroupId {
        self.group.id
    }

    /// Members ordered by id.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.get(&id)
    }

    pub fn member_by_name(&self, name: &str) -> Option<&Member> {
        self.members.values().find(|m| m.name == name)
    }

    pub fn is_member(&self, id: MemberId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn bills(&self) -> &[Bill] {
        &self.bills
    }

    pub fn bill(&self, id: BillId) -> Option<&Bill> {
        self.bills.iter().find(|b| b.id == id)
    }

    pub fn add_member(&mut self, member: Member) -> Result<(), LedgerError> {
        if member.group_id != self.group.id {
            return Err(ValidationError::WrongGroup {
                bill_group: member.group_id,
                group: self.group.id,
            }
            .into());
        }
        if self.member_by_name(&member.name).is_some() {
            return Err(LedgerError::MemberAlreadyExists(member.name));
        }
        self.members.insert(member.id, member);
        Ok(())
    }

    /// Remove a member that is settled and appears in no bill.
    pub fn remove_member(&mut self, id: MemberId) -> Result<Member, LedgerError> {
        if !self.is_member(id) {
            return Err(LedgerError::MemberNotFound(id));
        }

        let balance = net_amount(id, &self.bills);
        if balance != 0 {
            return Err(ValidationError::MemberHasBalance {
                member_id: id,
                balance,
            }
            .into());
        }

        let referenced = self.bills.iter().filter(|b| b.involves(id)).count();
        if referenced > 0 {
            return Err(ValidationError::MemberReferenced {
                member_id: id,
                bills: referenced,
            }
            .into());
        }

        self.members
            .remove(&id)
            .ok_or(LedgerError::MemberNotFound(id))
    }

    /// Validate a bill against this group without applying it.
    pub fn validate_bill(&self, bill: &Bill) -> Result<(), ValidationError> {
        if bill.group_id != self.group.id {
            return Err(ValidationError::WrongGroup {
                bill_group: bill.group_id,
                group: self.group.id,
            });
        }
        bill.validate_amounts()?;
        if let Some(unknown) = bill.participants().find(|id| !self.is_member(*id)) {
            return Err(ValidationError::UnknownMember(unknown));
        }
        Ok(())
    }

    pub fn add_bill(&mut self, bill: Bill) -> Result<(), ValidationError> {
        if self.bill(bill.id).is_some() {
            return Err(ValidationError::DuplicateBill(bill.id));
        }
        self.validate_bill(&bill)?;
        self.bills.push(bill);
        Ok(())
    }

    /// Replace an existing bill (same id), keeping its position and its
    /// original `recorded_at`. Returns the old bill.
    pub fn replace_bill(&mut self, mut bill: Bill) -> Result<Bill, LedgerError> {
        let index = self
            .bills
            .iter()
            .position(|b| b.id == bill.id)
            .ok_or(LedgerError::BillNotFound(bill.id))?;
        self.validate_bill(&bill)?;
        bill.recorded_at = self.bills[index].recorded_at;
        Ok(std::mem::replace(&mut self.bills[index], bill))
    }

    pub fn remove_bill(&mut self, id: BillId) -> Result<Bill, LedgerError> {
        let index = self
            .bills
            .iter()
            .position(|b| b.id == id)
            .ok_or(LedgerError::BillNotFound(id))?;
        Ok(self.bills.remove(index))
    }
}
