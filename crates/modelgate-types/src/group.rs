use crate::{CanonicalName, GroupId};

/// A declared set of supervisors governed by swap/exclusive/persistent
/// policies (spec §3 "Group entry").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GroupEntry {
    pub id: GroupId,
    pub members: Vec<CanonicalName>,
    /// Starting a member stops other running members of the group.
    pub swap: bool,
    /// Only one member may be in a running state simultaneously.
    pub exclusive: bool,
    /// Idle TTL is ignored for members of this group.
    pub persistent: bool,
}

impl GroupEntry {
    pub fn contains(&self, canonical: &CanonicalName) -> bool {
        self.members.iter().any(|m| m == canonical)
    }
}
