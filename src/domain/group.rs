use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type GroupId = Uuid;
pub type MemberId = Uuid;

/// A set of members sharing bills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Informational only; every amount in a group is in this currency.
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            currency: currency.into(),
            created_at: Utc::now(),
        }
    }
}

/// A participant in a group. Members are never edited, only added or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub group_id: GroupId,
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn new(group_id: GroupId, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            name: name.into(),
            joined_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_belongs_to_group() {
        let group = Group::new("Flat 4B", "EUR");
        let member = Member::new(group.id, "Alice");

        assert_eq!(member.group_id, group.id);
        assert_eq!(member.name, "Alice");
        assert_ne!(member.id, group.id);
    }
}
