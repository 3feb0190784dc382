//! Collar rows and the ownership graph.

use crate::{CollarAccess, EntityId, LockSlot, MoodleKind, Timestamp, Uid};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mood effect attached to a collar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodleDescriptor {
    pub id: EntityId,
    pub icon: u32,
    pub title: String,
    pub description: String,
    pub kind: MoodleKind,
    pub vfx_path: String,
}

impl Default for MoodleDescriptor {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            icon: 0,
            title: String::new(),
            description: String::new(),
            kind: MoodleKind::Positive,
            vfx_path: String::new(),
        }
    }
}

/// Collar state owned by the wearer. One row per wearer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollarData {
    pub wearer: Uid,
    pub visuals: bool,
    pub dye_one: u8,
    pub dye_two: u8,
    pub moodle: MoodleDescriptor,
    pub writing: String,
    /// What the wearer may still change on their own collar.
    pub edit_access: CollarAccess,
    /// What owners may change.
    pub owner_edit_access: CollarAccess,
    pub lock: LockSlot,
}

impl CollarData {
    pub fn new(wearer: Uid, owner_edit_access: CollarAccess) -> Self {
        Self {
            wearer,
            visuals: true,
            dye_one: 0,
            dye_two: 0,
            moodle: MoodleDescriptor::default(),
            writing: String::new(),
            edit_access: CollarAccess::all(),
            owner_edit_access,
            lock: LockSlot::default(),
        }
    }
}

/// A single edit to the decorative collar fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollarChange {
    Visuals(bool),
    Dyes { one: u8, two: u8 },
    Moodle(MoodleDescriptor),
    Writing(String),
}

impl CollarChange {
    /// Access bit an editor needs for this change.
    pub fn required_access(&self) -> CollarAccess {
        match self {
            CollarChange::Visuals(_) => CollarAccess::VISUALS,
            CollarChange::Dyes { .. } => CollarAccess::DYES,
            CollarChange::Moodle(_) => CollarAccess::MOODLE,
            CollarChange::Writing(_) => CollarAccess::WRITING,
        }
    }

    pub fn apply_to(self, collar: &mut CollarData) {
        match self {
            CollarChange::Visuals(v) => collar.visuals = v,
            CollarChange::Dyes { one, two } => {
                collar.dye_one = one;
                collar.dye_two = two;
            }
            CollarChange::Moodle(m) => collar.moodle = m,
            CollarChange::Writing(w) => collar.writing = w,
        }
    }
}

/// Non-owning edge from an owner to a collared identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollarOwner {
    pub owner: Uid,
    pub collared: Uid,
    pub created_at: Timestamp,
}

/// Pending offer to collar `wearer`. Keyed by `(requester, wearer)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollarRequest {
    pub requester: Uid,
    pub wearer: Uid,
    pub created_at: Timestamp,
    pub terms: String,
    pub is_temporary: bool,
    /// Seeds `owner_edit_access` when the collar row is created.
    pub initial_owner_access: CollarAccess,
}

/// Earliest edge wins; ties break on owner uid so the answer is stable.
pub fn primary_owner(owners: &[CollarOwner]) -> Option<&CollarOwner> {
    owners
        .iter()
        .min_by(|a, b| (a.created_at, &a.owner).cmp(&(b.created_at, &b.owner)))
}
