//! Tether Storage - Storage Trait and In-Memory Implementation
//!
//! Defines the persisted contract for Tether entities. Every mutable row is
//! versioned and written with compare-and-swap; multi-row changes (pairing,
//! unpairing, identity deletion, collar acceptance) are single atomic
//! operations on the trait so no reader can observe them half applied.

mod memory;
mod table;

pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use tether_core::{
    CapabilityGrant, CollarData, CollarOwner, CollarRequest, GagLayer, GlobalPermissions,
    GrantAccess, HardcoreState, OwnerRemovalPolicy, PairEdge, RestraintSlot, RestrictionLayer,
    TetherResult, Timestamp, Uid, User, Version, Versioned,
};

// ============================================================================
// OPERATION REPORTS
// ============================================================================

/// Rows touched by an identity deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub edges_removed: usize,
    pub grants_removed: usize,
    pub access_removed: usize,
    pub layers_removed: usize,
    pub hardcore_removed: bool,
    pub collar_removed: bool,
    pub owner_edges_removed: usize,
    /// Collars of other wearers deleted because the identity was their last owner
    pub orphaned_collars_removed: usize,
    pub requests_removed: usize,
    /// Padlocks elsewhere that the identity had assigned
    pub locks_released: usize,
    /// Hardcore overrides elsewhere that the identity had assigned
    pub overrides_released: usize,
}

/// Outcome of removing a pairing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRemoval {
    pub locks_released: usize,
    pub overrides_released: usize,
}

/// Outcome of removing a collar owner edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRemoval {
    pub remaining_owners: usize,
    pub collar_removed: bool,
}

/// Outcome of accepting a collar request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollarAcceptance {
    pub request: CollarRequest,
    pub collar_created: bool,
}

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Storage trait for Tether entities.
///
/// `expected: Option<Version>` parameters are compare-and-swap preconditions:
/// `None` requires the row to be absent, `Some(v)` requires version `v`.
/// A mismatch fails with `StorageError::StaleVersion`.
pub trait StoreTrait: Send + Sync {
    // === Identity Operations ===

    /// Insert a user together with its global permission row.
    fn user_register(&self, user: &User, globals: &GlobalPermissions) -> TetherResult<()>;

    fn user_get(&self, uid: &Uid) -> TetherResult<Option<Versioned<User>>>;

    fn user_update(&self, expected: Version, user: &User) -> TetherResult<Version>;

    /// Delete a user and every row that references it, in one transaction.
    fn user_delete(&self, uid: &Uid) -> TetherResult<CascadeReport>;

    // === Pair Directory Operations ===

    /// Create both directed edges with default grant and access rows.
    fn pair_create(&self, a: &Uid, b: &Uid, now: Timestamp) -> TetherResult<()>;

    /// Remove both directed edges and their grant and access rows.
    /// With `release_locks`, padlocks and overrides either side assigned on
    /// the other are released in the same transaction.
    fn pair_remove(&self, a: &Uid, b: &Uid, release_locks: bool) -> TetherResult<PairRemoval>;

    fn pair_edge_get(&self, owner: &Uid, partner: &Uid) -> TetherResult<Option<PairEdge>>;

    /// Outgoing edges of `owner`.
    fn pair_edges_of(&self, owner: &Uid) -> TetherResult<Vec<PairEdge>>;

    // === Grant Operations ===

    fn grant_get(&self, owner: &Uid, partner: &Uid)
        -> TetherResult<Option<Versioned<CapabilityGrant>>>;

    fn grant_update(&self, expected: Version, grant: &CapabilityGrant) -> TetherResult<Version>;

    fn access_get(&self, owner: &Uid, partner: &Uid) -> TetherResult<Option<Versioned<GrantAccess>>>;

    fn access_update(&self, expected: Version, access: &GrantAccess) -> TetherResult<Version>;

    // === Global Permission Operations ===

    fn globals_get(&self, uid: &Uid) -> TetherResult<Option<Versioned<GlobalPermissions>>>;

    fn globals_update(&self, expected: Version, globals: &GlobalPermissions)
        -> TetherResult<Version>;

    // === Layer Operations ===

    fn gag_get(&self, uid: &Uid, layer: u8) -> TetherResult<Option<Versioned<GagLayer>>>;

    fn gag_put(
        &self,
        uid: &Uid,
        layer: u8,
        expected: Option<Version>,
        state: &GagLayer,
    ) -> TetherResult<Version>;

    fn restriction_get(&self, uid: &Uid, layer: u8)
        -> TetherResult<Option<Versioned<RestrictionLayer>>>;

    fn restriction_put(
        &self,
        uid: &Uid,
        layer: u8,
        expected: Option<Version>,
        state: &RestrictionLayer,
    ) -> TetherResult<Version>;

    fn restraint_get(&self, uid: &Uid) -> TetherResult<Option<Versioned<RestraintSlot>>>;

    fn restraint_put(
        &self,
        uid: &Uid,
        expected: Option<Version>,
        state: &RestraintSlot,
    ) -> TetherResult<Version>;

    // === Hardcore Operations ===

    fn hardcore_get(&self, uid: &Uid) -> TetherResult<Option<Versioned<HardcoreState>>>;

    fn hardcore_put(&self, expected: Option<Version>, state: &HardcoreState)
        -> TetherResult<Version>;

    // === Collar Operations ===

    fn collar_get(&self, wearer: &Uid) -> TetherResult<Option<Versioned<CollarData>>>;

    fn collar_update(&self, expected: Version, collar: &CollarData) -> TetherResult<Version>;

    /// Owner edges of `wearer`, oldest first.
    fn collar_owners(&self, wearer: &Uid) -> TetherResult<Vec<CollarOwner>>;

    /// Add an owner edge to an existing collar.
    fn collar_owner_add(&self, edge: &CollarOwner) -> TetherResult<()>;

    /// Remove an owner edge, applying `policy` when it is the last one.
    fn collar_owner_remove(
        &self,
        wearer: &Uid,
        owner: &Uid,
        policy: OwnerRemovalPolicy,
    ) -> TetherResult<OwnerRemoval>;

    fn collar_request_insert(&self, request: &CollarRequest) -> TetherResult<()>;

    fn collar_request_get(&self, requester: &Uid, wearer: &Uid)
        -> TetherResult<Option<CollarRequest>>;

    fn collar_request_remove(&self, requester: &Uid, wearer: &Uid) -> TetherResult<CollarRequest>;

    /// Pending requests addressed to `wearer`.
    fn collar_requests_for(&self, wearer: &Uid) -> TetherResult<Vec<CollarRequest>>;

    /// Consume a request, creating the collar row if absent and adding the
    /// requester as an owner.
    fn collar_accept(
        &self,
        requester: &Uid,
        wearer: &Uid,
        now: Timestamp,
    ) -> TetherResult<CollarAcceptance>;
}
