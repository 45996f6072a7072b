//! Transaction items and groups.
//!
//! On the wire a group is an ordered `itemList`: by convention the first entry describes the
//! group itself (its `taskKey` equals the group id and its status is the group's aggregate
//! status), the second is the initiator and anything after that is an already-known participant.
//! [`GroupEnlistment`] gives each position its own type so callers never index the list.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A numeric code that does not map to any variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCode {
    pub kind: &'static str,
    pub code: i32,
}

impl fmt::Display for UnknownCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} code {}", self.kind, self.code)
    }
}

impl std::error::Error for UnknownCode {}

/// Life-cycle status of one item.
///
/// `Created -> PreCommitted -> Committed` on the happy path, `Created -> RolledBack` on abort.
/// Transitions are not order-checked anywhere: a late notification simply overwrites.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum TransactionStatus {
    RolledBack,
    Committed,
    #[default]
    Created,
    PreCommitted,
}

impl TransactionStatus {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::RolledBack => 0,
            Self::Committed => 1,
            Self::Created => 2,
            Self::PreCommitted => 5,
        }
    }
}

impl From<TransactionStatus> for i32 {
    fn from(status: TransactionStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for TransactionStatus {
    type Error = UnknownCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::RolledBack),
            1 => Ok(Self::Committed),
            2 => Ok(Self::Created),
            5 => Ok(Self::PreCommitted),
            _ => Err(UnknownCode { kind: "status", code }),
        }
    }
}

/// Role of an item inside its group.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum TransactionRole {
    /// The transaction initiator.
    Start,
    #[default]
    Participant,
}

impl TransactionRole {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Start => 0,
            Self::Participant => 1,
        }
    }
}

impl From<TransactionRole> for i32 {
    fn from(role: TransactionRole) -> Self {
        role.code()
    }
}

impl TryFrom<i32> for TransactionRole {
    type Error = UnknownCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Start),
            1 => Ok(Self::Participant),
            _ => Err(UnknownCode { kind: "role", code }),
        }
    }
}

/// One persisted record within a group, keyed by `task_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub task_key: String,
    #[serde(default)]
    pub role: TransactionRole,
    #[serde(default)]
    pub status: TransactionStatus,
    /// Network identity of the owning endpoint. Always stamped by the coordinator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Domain of the coordinator that accepted the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tm_domain: Option<String>,
}

impl TransactionItem {
    /// A fresh item in [`TransactionStatus::Created`].
    pub fn new(task_key: impl Into<String>, role: TransactionRole) -> Self {
        Self {
            task_key: task_key.into(),
            role,
            status: TransactionStatus::Created,
            model_name: None,
            tm_domain: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }
}

/// Where an enlisted item came from, as observed by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// Remote address of the connection that sent the request.
    pub model_name: String,
    /// The coordinator's own domain.
    pub tm_domain: String,
}

/// A group on the wire: its id and the ordered item list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionGroup {
    pub id: String,
    #[serde(default)]
    pub item_list: Vec<TransactionItem>,
}

/// The group-level record (first wire item). No remote endpoint is attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDescriptor(TransactionItem);

impl GroupDescriptor {
    #[must_use]
    pub fn task_key(&self) -> &str {
        &self.0.task_key
    }

    #[must_use]
    pub const fn status(&self) -> TransactionStatus {
        self.0.status
    }

    #[must_use]
    pub fn into_inner(self) -> TransactionItem {
        self.0
    }
}

/// An item owned by a remote endpoint (initiator or participant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantItem(TransactionItem);

impl ParticipantItem {
    #[must_use]
    pub const fn new(item: TransactionItem) -> Self {
        Self(item)
    }

    /// Overwrites the endpoint identity with what the coordinator observed.
    pub fn stamp(&mut self, origin: &Origin) {
        self.0.model_name = Some(origin.model_name.clone());
        self.0.tm_domain = Some(origin.tm_domain.clone());
    }

    #[must_use]
    pub fn item(&self) -> &TransactionItem {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> TransactionItem {
        self.0
    }
}

/// Typed view of a [`TransactionGroup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEnlistment {
    pub id: String,
    pub descriptor: Option<GroupDescriptor>,
    pub initiator: Option<ParticipantItem>,
    pub participants: Vec<ParticipantItem>,
}

impl GroupEnlistment {
    /// Stamps the initiator, if the group has one. The descriptor is never stamped.
    pub fn stamp_initiator(&mut self, origin: &Origin) {
        if let Some(initiator) = &mut self.initiator {
            initiator.stamp(origin);
        }
    }
}

impl From<TransactionGroup> for GroupEnlistment {
    fn from(group: TransactionGroup) -> Self {
        let mut items = group.item_list.into_iter();
        Self {
            id: group.id,
            descriptor: items.next().map(GroupDescriptor),
            initiator: items.next().map(ParticipantItem),
            participants: items.map(ParticipantItem).collect(),
        }
    }
}

impl From<GroupEnlistment> for TransactionGroup {
    fn from(enlistment: GroupEnlistment) -> Self {
        let item_list = enlistment
            .descriptor
            .map(GroupDescriptor::into_inner)
            .into_iter()
            .chain(enlistment.initiator.map(ParticipantItem::into_inner))
            .chain(enlistment.participants.into_iter().map(ParticipantItem::into_inner))
            .collect();
        Self { id: enlistment.id, item_list }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin { model_name: "/10.0.0.7:51234".to_owned(), tm_domain: "tm-a:9876".to_owned() }
    }

    #[test]
    fn test_enlistment_keeps_wire_order() {
        let group = TransactionGroup {
            id: "G1".to_owned(),
            item_list: vec![
                TransactionItem::new("G1", TransactionRole::Participant),
                TransactionItem::new("init", TransactionRole::Start),
                TransactionItem::new("p1", TransactionRole::Participant),
            ],
        };

        let enlistment = GroupEnlistment::from(group.clone());
        assert_eq!(enlistment.descriptor.as_ref().map(GroupDescriptor::task_key), Some("G1"));
        assert_eq!(enlistment.participants.len(), 1);
        assert_eq!(TransactionGroup::from(enlistment), group);
    }

    #[test]
    fn test_only_initiator_is_stamped() {
        let mut spoofed = TransactionItem::new("init", TransactionRole::Start);
        spoofed.model_name = Some("evil".to_owned());
        let group = TransactionGroup {
            id: "G1".to_owned(),
            item_list: vec![
                TransactionItem::new("G1", TransactionRole::Participant),
                spoofed,
                TransactionItem::new("p1", TransactionRole::Participant),
            ],
        };

        let mut enlistment = GroupEnlistment::from(group);
        enlistment.stamp_initiator(&origin());
        let items = TransactionGroup::from(enlistment).item_list;

        assert_eq!(items[0].model_name, None);
        assert_eq!(items[1].model_name.as_deref(), Some("/10.0.0.7:51234"));
        assert_eq!(items[1].tm_domain.as_deref(), Some("tm-a:9876"));
        assert_eq!(items[2].model_name, None);
    }

    #[test]
    fn test_initiator_is_chosen_by_position_not_role() {
        let mut enlistment = GroupEnlistment::from(TransactionGroup {
            id: "G1".to_owned(),
            item_list: vec![
                TransactionItem::new("G1", TransactionRole::Participant),
                TransactionItem::new("p1", TransactionRole::Participant),
                TransactionItem::new("init", TransactionRole::Start),
            ],
        });
        enlistment.stamp_initiator(&origin());
        let items = TransactionGroup::from(enlistment).item_list;

        assert_eq!(items[1].task_key, "p1");
        assert_eq!(items[1].model_name.as_deref(), Some("/10.0.0.7:51234"));
        assert_eq!(items[2].task_key, "init");
        assert_eq!(items[2].model_name, None);
    }

    #[test]
    fn test_short_groups_have_no_initiator() {
        let mut enlistment = GroupEnlistment::from(TransactionGroup {
            id: "G1".to_owned(),
            item_list: vec![TransactionItem::new("G1", TransactionRole::Participant)],
        });
        enlistment.stamp_initiator(&origin());

        assert!(enlistment.initiator.is_none());
        assert!(enlistment.descriptor.is_some());
    }

    #[test]
    fn test_codes_roundtrip() {
        for status in [
            TransactionStatus::RolledBack,
            TransactionStatus::Committed,
            TransactionStatus::Created,
            TransactionStatus::PreCommitted,
        ] {
            assert_eq!(TransactionStatus::try_from(status.code()), Ok(status));
        }
        assert_eq!(
            TransactionStatus::try_from(9),
            Err(UnknownCode { kind: "status", code: 9 })
        );
        assert_eq!(TransactionRole::try_from(0), Ok(TransactionRole::Start));
    }
}
