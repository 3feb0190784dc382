//! In-memory store.
//!
//! All tables sit behind one `RwLock`. Multi-row operations run against a
//! staged copy of the tables that is swapped in only on success, so a failed
//! cascade leaves nothing behind and readers never see a partial one.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tether_core::{
    CapabilityGrant, CollarData, CollarOwner, CollarRequest, EntityType, GagLayer,
    GlobalPermissions, GrantAccess, HardcoreState, LockSlot, OwnerRemovalPolicy, PairEdge,
    RestraintSlot, RestrictionLayer, StorageError, TetherError, TetherResult, Timestamp, Uid,
    User, Version, Versioned,
};

use crate::table::VersionedTable;
use crate::{CascadeReport, CollarAcceptance, OwnerRemoval, PairRemoval, StoreTrait};

type EdgeKey = (Uid, Uid);
type LayerKey = (Uid, u8);

#[derive(Debug, Clone)]
struct Tables {
    users: VersionedTable<Uid, User>,
    pair_edges: VersionedTable<EdgeKey, PairEdge>,
    grants: VersionedTable<EdgeKey, CapabilityGrant>,
    access: VersionedTable<EdgeKey, GrantAccess>,
    globals: VersionedTable<Uid, GlobalPermissions>,
    gags: VersionedTable<LayerKey, GagLayer>,
    restrictions: VersionedTable<LayerKey, RestrictionLayer>,
    restraints: VersionedTable<Uid, RestraintSlot>,
    hardcore: VersionedTable<Uid, HardcoreState>,
    collars: VersionedTable<Uid, CollarData>,
    /// Keyed by (collared, owner)
    collar_owners: VersionedTable<EdgeKey, CollarOwner>,
    /// Keyed by (requester, wearer)
    collar_requests: VersionedTable<EdgeKey, CollarRequest>,
}

impl Tables {
    fn new() -> Self {
        Self {
            users: VersionedTable::new(EntityType::User),
            pair_edges: VersionedTable::new(EntityType::PairEdge),
            grants: VersionedTable::new(EntityType::CapabilityGrant),
            access: VersionedTable::new(EntityType::GrantAccess),
            globals: VersionedTable::new(EntityType::GlobalPermissions),
            gags: VersionedTable::new(EntityType::GagState),
            restrictions: VersionedTable::new(EntityType::RestrictionState),
            restraints: VersionedTable::new(EntityType::RestraintSetState),
            hardcore: VersionedTable::new(EntityType::HardcoreState),
            collars: VersionedTable::new(EntityType::CollarState),
            collar_owners: VersionedTable::new(EntityType::CollarOwner),
            collar_requests: VersionedTable::new(EntityType::CollarRequest),
        }
    }

    fn require_user(&self, uid: &Uid) -> TetherResult<()> {
        if self.users.contains(uid) {
            Ok(())
        } else {
            Err(TetherError::not_found(EntityType::User, uid))
        }
    }

    /// Foreign-key check for rows keyed by a uid.
    fn require_referenced(&self, entity_type: EntityType, uid: &Uid) -> TetherResult<()> {
        if self.users.contains(uid) {
            Ok(())
        } else {
            Err(StorageError::Integrity {
                entity_type,
                reason: format!("no user {}", uid),
            }
            .into())
        }
    }

    /// Clear padlocks assigned by `assigner` on wearers matching `wearer`.
    fn release_padlocks(&mut self, wearer: impl Fn(&Uid) -> bool, assigner: &Uid) -> usize {
        let assigned = |lock: &LockSlot| lock.assigner.as_ref() == Some(assigner);
        let mut released = 0;
        released += self.gags.modify_where(|(uid, _), state| {
            let hit = wearer(uid) && assigned(&state.lock);
            if hit {
                state.lock = LockSlot::default();
            }
            hit
        });
        released += self.restrictions.modify_where(|(uid, _), state| {
            let hit = wearer(uid) && assigned(&state.lock);
            if hit {
                state.lock = LockSlot::default();
            }
            hit
        });
        released += self.restraints.modify_where(|uid, state| {
            let hit = wearer(uid) && assigned(&state.lock);
            if hit {
                state.lock = LockSlot::default();
            }
            hit
        });
        released += self.collars.modify_where(|uid, collar| {
            let hit = wearer(uid) && assigned(&collar.lock);
            if hit {
                collar.lock = LockSlot::default();
            }
            hit
        });
        released
    }

    /// Clear hardcore overrides assigned by `assigner` on wearers matching `wearer`.
    fn release_overrides(&mut self, wearer: impl Fn(&Uid) -> bool, assigner: &Uid) -> usize {
        let mut released = 0;
        self.hardcore.modify_where(|uid, state| {
            if !wearer(uid) {
                return false;
            }
            let cleared = state.release_assigned_by(assigner).len();
            released += cleared;
            cleared > 0
        });
        released
    }

    fn remove_pair_rows(&mut self, owner: &Uid, partner: &Uid) -> bool {
        let key = (owner.clone(), partner.clone());
        let existed = self.pair_edges.remove(&key).is_some();
        self.grants.remove(&key);
        self.access.remove(&key);
        existed
    }
}

/// In-memory, versioned, transactional store.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
        }
    }

    fn read(&self) -> TetherResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> TetherResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StorageError::LockPoisoned.into())
    }

    /// Run `f` against a staged copy; commit only if it succeeds.
    fn transact<R>(&self, f: impl FnOnce(&mut Tables) -> TetherResult<R>) -> TetherResult<R> {
        let mut tables = self.write()?;
        let mut staged = Tables::clone(&tables);
        let result = f(&mut staged)?;
        *tables = staged;
        Ok(result)
    }

    /// Number of rows in one table.
    pub fn count(&self, entity_type: EntityType) -> TetherResult<usize> {
        let t = self.read()?;
        Ok(match entity_type {
            EntityType::User => t.users.len(),
            EntityType::PairEdge => t.pair_edges.len(),
            EntityType::CapabilityGrant => t.grants.len(),
            EntityType::GrantAccess => t.access.len(),
            EntityType::GlobalPermissions => t.globals.len(),
            EntityType::GagState => t.gags.len(),
            EntityType::RestrictionState => t.restrictions.len(),
            EntityType::RestraintSetState => t.restraints.len(),
            EntityType::HardcoreState => t.hardcore.len(),
            EntityType::CollarState => t.collars.len(),
            EntityType::CollarOwner => t.collar_owners.len(),
            EntityType::CollarRequest => t.collar_requests.len(),
        })
    }

    /// Rows that reference `uid` as a key or foreign key. Zero after a
    /// successful deletion of `uid`.
    pub fn rows_referencing(&self, uid: &Uid) -> TetherResult<usize> {
        let t = self.read()?;
        let edge = |(a, b): &EdgeKey| a == uid || b == uid;
        let layer = |(owner, _): &LayerKey| owner == uid;
        Ok(usize::from(t.users.contains(uid))
            + usize::from(t.globals.contains(uid))
            + t.pair_edges.keys_where(|k, _| edge(k)).len()
            + t.grants.keys_where(|k, _| edge(k)).len()
            + t.access.keys_where(|k, _| edge(k)).len()
            + t.gags.keys_where(|k, _| layer(k)).len()
            + t.restrictions.keys_where(|k, _| layer(k)).len()
            + usize::from(t.restraints.contains(uid))
            + usize::from(t.hardcore.contains(uid))
            + usize::from(t.collars.contains(uid))
            + t.collar_owners.keys_where(|k, _| edge(k)).len()
            + t.collar_requests.keys_where(|k, _| edge(k)).len())
    }
}

impl StoreTrait for MemoryStore {
    // === Identity Operations ===

    fn user_register(&self, user: &User, globals: &GlobalPermissions) -> TetherResult<()> {
        if user.uid != globals.uid {
            return Err(StorageError::Integrity {
                entity_type: EntityType::GlobalPermissions,
                reason: format!("globals for {} registered with user {}", globals.uid, user.uid),
            }
            .into());
        }
        self.transact(|t| {
            t.users.insert_new(user.uid.clone(), user.clone())?;
            t.globals.insert_new(globals.uid.clone(), globals.clone())?;
            Ok(())
        })
    }

    fn user_get(&self, uid: &Uid) -> TetherResult<Option<Versioned<User>>> {
        Ok(self.read()?.users.get(uid))
    }

    fn user_update(&self, expected: Version, user: &User) -> TetherResult<Version> {
        self.write()?
            .users
            .update(user.uid.clone(), expected, user.clone())
    }

    fn user_delete(&self, uid: &Uid) -> TetherResult<CascadeReport> {
        self.transact(|t| {
            t.require_user(uid)?;
            let mut report = CascadeReport::default();

            t.users.remove(uid);
            t.globals.remove(uid);

            let edge = |(a, b): &EdgeKey| a == uid || b == uid;
            report.edges_removed = t.pair_edges.remove_where(|k, _| edge(k));
            report.grants_removed = t.grants.remove_where(|k, _| edge(k));
            report.access_removed = t.access.remove_where(|k, _| edge(k));

            report.layers_removed = t.gags.remove_where(|(owner, _), _| owner == uid)
                + t.restrictions.remove_where(|(owner, _), _| owner == uid)
                + usize::from(t.restraints.remove(uid).is_some());
            report.hardcore_removed = t.hardcore.remove(uid).is_some();

            report.collar_removed = t.collars.remove(uid).is_some();
            report.owner_edges_removed = t.collar_owners.remove_where(|(collared, _), _| collared == uid);

            let owned: Vec<Uid> = t
                .collar_owners
                .keys_where(|(_, owner), _| owner == uid)
                .into_iter()
                .map(|(collared, _)| collared)
                .collect();
            report.owner_edges_removed += t.collar_owners.remove_where(|(_, owner), _| owner == uid);
            for wearer in owned {
                let remaining = t
                    .collar_owners
                    .keys_where(|(collared, _), _| collared == &wearer)
                    .len();
                if remaining == 0 && t.collars.remove(&wearer).is_some() {
                    report.orphaned_collars_removed += 1;
                }
            }

            report.requests_removed = t.collar_requests.remove_where(|k, _| edge(k));

            report.locks_released = t.release_padlocks(|_| true, uid);
            report.overrides_released = t.release_overrides(|_| true, uid);

            tracing::debug!(
                %uid,
                edges = report.edges_removed,
                layers = report.layers_removed,
                locks_released = report.locks_released,
                "Staged identity cascade"
            );
            Ok(report)
        })
    }

    // === Pair Directory Operations ===

    fn pair_create(&self, a: &Uid, b: &Uid, now: Timestamp) -> TetherResult<()> {
        if a == b {
            return Err(StorageError::Integrity {
                entity_type: EntityType::PairEdge,
                reason: format!("{} cannot pair with itself", a),
            }
            .into());
        }
        self.transact(|t| {
            t.require_user(a)?;
            t.require_user(b)?;
            for (owner, partner) in [(a, b), (b, a)] {
                let key = (owner.clone(), partner.clone());
                t.pair_edges.insert_new(
                    key.clone(),
                    PairEdge {
                        owner: owner.clone(),
                        partner: partner.clone(),
                        created_at: now,
                    },
                )?;
                t.grants
                    .insert_new(key.clone(), CapabilityGrant::new(owner.clone(), partner.clone()))?;
                t.access
                    .insert_new(key, GrantAccess::new(owner.clone(), partner.clone()))?;
            }
            Ok(())
        })
    }

    fn pair_remove(&self, a: &Uid, b: &Uid, release_locks: bool) -> TetherResult<PairRemoval> {
        self.transact(|t| {
            let forward = t.remove_pair_rows(a, b);
            let backward = t.remove_pair_rows(b, a);
            if !forward && !backward {
                return Err(TetherError::not_found(
                    EntityType::PairEdge,
                    format!("{}->{}", a, b),
                ));
            }
            let mut removal = PairRemoval::default();
            if release_locks {
                removal.locks_released =
                    t.release_padlocks(|w| w == a, b) + t.release_padlocks(|w| w == b, a);
                removal.overrides_released =
                    t.release_overrides(|w| w == a, b) + t.release_overrides(|w| w == b, a);
                tracing::debug!(
                    %a,
                    %b,
                    locks = removal.locks_released,
                    overrides = removal.overrides_released,
                    "Released cross-pair locks"
                );
            }
            Ok(removal)
        })
    }

    fn pair_edge_get(&self, owner: &Uid, partner: &Uid) -> TetherResult<Option<PairEdge>> {
        let key = (owner.clone(), partner.clone());
        Ok(self.read()?.pair_edges.get(&key).map(|row| row.data))
    }

    fn pair_edges_of(&self, owner: &Uid) -> TetherResult<Vec<PairEdge>> {
        Ok(self
            .read()?
            .pair_edges
            .values_where(|(o, _), _| o == owner))
    }

    // === Grant Operations ===

    fn grant_get(
        &self,
        owner: &Uid,
        partner: &Uid,
    ) -> TetherResult<Option<Versioned<CapabilityGrant>>> {
        let key = (owner.clone(), partner.clone());
        Ok(self.read()?.grants.get(&key))
    }

    fn grant_update(&self, expected: Version, grant: &CapabilityGrant) -> TetherResult<Version> {
        let key = (grant.owner.clone(), grant.partner.clone());
        self.write()?.grants.update(key, expected, grant.clone())
    }

    fn access_get(&self, owner: &Uid, partner: &Uid) -> TetherResult<Option<Versioned<GrantAccess>>> {
        let key = (owner.clone(), partner.clone());
        Ok(self.read()?.access.get(&key))
    }

    fn access_update(&self, expected: Version, access: &GrantAccess) -> TetherResult<Version> {
        let key = (access.owner.clone(), access.partner.clone());
        self.write()?.access.update(key, expected, access.clone())
    }

    // === Global Permission Operations ===

    fn globals_get(&self, uid: &Uid) -> TetherResult<Option<Versioned<GlobalPermissions>>> {
        Ok(self.read()?.globals.get(uid))
    }

    fn globals_update(
        &self,
        expected: Version,
        globals: &GlobalPermissions,
    ) -> TetherResult<Version> {
        self.write()?
            .globals
            .update(globals.uid.clone(), expected, globals.clone())
    }

    // === Layer Operations ===

    fn gag_get(&self, uid: &Uid, layer: u8) -> TetherResult<Option<Versioned<GagLayer>>> {
        Ok(self.read()?.gags.get(&(uid.clone(), layer)))
    }

    fn gag_put(
        &self,
        uid: &Uid,
        layer: u8,
        expected: Option<Version>,
        state: &GagLayer,
    ) -> TetherResult<Version> {
        let mut t = self.write()?;
        t.require_referenced(EntityType::GagState, uid)?;
        t.gags.put((uid.clone(), layer), expected, state.clone())
    }

    fn restriction_get(
        &self,
        uid: &Uid,
        layer: u8,
    ) -> TetherResult<Option<Versioned<RestrictionLayer>>> {
        Ok(self.read()?.restrictions.get(&(uid.clone(), layer)))
    }

    fn restriction_put(
        &self,
        uid: &Uid,
        layer: u8,
        expected: Option<Version>,
        state: &RestrictionLayer,
    ) -> TetherResult<Version> {
        let mut t = self.write()?;
        t.require_referenced(EntityType::RestrictionState, uid)?;
        t.restrictions
            .put((uid.clone(), layer), expected, state.clone())
    }

    fn restraint_get(&self, uid: &Uid) -> TetherResult<Option<Versioned<RestraintSlot>>> {
        Ok(self.read()?.restraints.get(uid))
    }

    fn restraint_put(
        &self,
        uid: &Uid,
        expected: Option<Version>,
        state: &RestraintSlot,
    ) -> TetherResult<Version> {
        let mut t = self.write()?;
        t.require_referenced(EntityType::RestraintSetState, uid)?;
        t.restraints.put(uid.clone(), expected, state.clone())
    }

    // === Hardcore Operations ===

    fn hardcore_get(&self, uid: &Uid) -> TetherResult<Option<Versioned<HardcoreState>>> {
        Ok(self.read()?.hardcore.get(uid))
    }

    fn hardcore_put(
        &self,
        expected: Option<Version>,
        state: &HardcoreState,
    ) -> TetherResult<Version> {
        let mut t = self.write()?;
        t.require_referenced(EntityType::HardcoreState, &state.uid)?;
        t.hardcore.put(state.uid.clone(), expected, state.clone())
    }

    // === Collar Operations ===

    fn collar_get(&self, wearer: &Uid) -> TetherResult<Option<Versioned<CollarData>>> {
        Ok(self.read()?.collars.get(wearer))
    }

    fn collar_update(&self, expected: Version, collar: &CollarData) -> TetherResult<Version> {
        self.write()?
            .collars
            .update(collar.wearer.clone(), expected, collar.clone())
    }

    fn collar_owners(&self, wearer: &Uid) -> TetherResult<Vec<CollarOwner>> {
        let mut owners = self
            .read()?
            .collar_owners
            .values_where(|(collared, _), _| collared == wearer);
        owners.sort_by(|a, b| (a.created_at, &a.owner).cmp(&(b.created_at, &b.owner)));
        Ok(owners)
    }

    fn collar_owner_add(&self, edge: &CollarOwner) -> TetherResult<()> {
        let mut t = self.write()?;
        if !t.collars.contains(&edge.collared) {
            return Err(TetherError::not_found(EntityType::CollarState, &edge.collared));
        }
        t.require_referenced(EntityType::CollarOwner, &edge.owner)?;
        t.collar_owners.insert_new(
            (edge.collared.clone(), edge.owner.clone()),
            edge.clone(),
        )?;
        Ok(())
    }

    fn collar_owner_remove(
        &self,
        wearer: &Uid,
        owner: &Uid,
        policy: OwnerRemovalPolicy,
    ) -> TetherResult<OwnerRemoval> {
        self.transact(|t| {
            let key = (wearer.clone(), owner.clone());
            if !t.collar_owners.contains(&key) {
                return Err(TetherError::not_found(
                    EntityType::CollarOwner,
                    format!("{}->{}", owner, wearer),
                ));
            }
            let owners = t
                .collar_owners
                .keys_where(|(collared, _), _| collared == wearer)
                .len();
            if owners == 1 && policy == OwnerRemovalPolicy::Restrict {
                return Err(StorageError::Integrity {
                    entity_type: EntityType::CollarOwner,
                    reason: format!("{} is the last owner of {}", owner, wearer),
                }
                .into());
            }
            t.collar_owners.remove(&key);
            let remaining = owners - 1;
            let collar_removed = remaining == 0 && t.collars.remove(wearer).is_some();
            Ok(OwnerRemoval {
                remaining_owners: remaining,
                collar_removed,
            })
        })
    }

    fn collar_request_insert(&self, request: &CollarRequest) -> TetherResult<()> {
        let mut t = self.write()?;
        t.require_referenced(EntityType::CollarRequest, &request.requester)?;
        t.require_referenced(EntityType::CollarRequest, &request.wearer)?;
        t.collar_requests.insert_new(
            (request.requester.clone(), request.wearer.clone()),
            request.clone(),
        )?;
        Ok(())
    }

    fn collar_request_get(
        &self,
        requester: &Uid,
        wearer: &Uid,
    ) -> TetherResult<Option<CollarRequest>> {
        let key = (requester.clone(), wearer.clone());
        Ok(self.read()?.collar_requests.get(&key).map(|row| row.data))
    }

    fn collar_request_remove(&self, requester: &Uid, wearer: &Uid) -> TetherResult<CollarRequest> {
        let key = (requester.clone(), wearer.clone());
        self.write()?
            .collar_requests
            .remove(&key)
            .map(|row| row.data)
            .ok_or_else(|| {
                TetherError::not_found(
                    EntityType::CollarRequest,
                    format!("{}->{}", requester, wearer),
                )
            })
    }

    fn collar_requests_for(&self, wearer: &Uid) -> TetherResult<Vec<CollarRequest>> {
        Ok(self
            .read()?
            .collar_requests
            .values_where(|(_, w), _| w == wearer))
    }

    fn collar_accept(
        &self,
        requester: &Uid,
        wearer: &Uid,
        now: Timestamp,
    ) -> TetherResult<CollarAcceptance> {
        self.transact(|t| {
            let request = t
                .collar_requests
                .remove(&(requester.clone(), wearer.clone()))
                .map(|row| row.data)
                .ok_or_else(|| {
                    TetherError::not_found(
                        EntityType::CollarRequest,
                        format!("{}->{}", requester, wearer),
                    )
                })?;
            t.require_referenced(EntityType::CollarState, wearer)?;

            let collar_created = !t.collars.contains(wearer);
            if collar_created {
                t.collars.insert_new(
                    wearer.clone(),
                    CollarData::new(wearer.clone(), request.initial_owner_access),
                )?;
            }
            t.collar_owners.insert_new(
                (wearer.clone(), requester.clone()),
                CollarOwner {
                    owner: requester.clone(),
                    collared: wearer.clone(),
                    created_at: now,
                },
            )?;
            Ok(CollarAcceptance {
                request,
                collar_created,
            })
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
