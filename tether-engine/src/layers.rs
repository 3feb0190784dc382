//! Lock state machine over gags, restrictions and restraint sets.
//!
//! Each surface is a [`LockSurface`]: a content type, the five capabilities
//! that gate it, and where its rows live. The transitions are shared:
//!
//! ```text
//! empty ── apply ──→ occupied ── lock ──→ occupied+locked
//!   ↑                   │  ↑                    │
//!   └───── remove ──────┘  └────── unlock ──────┘
//! ```
//!
//! Timed padlocks are never cleared by a timer. Whichever read or write
//! first observes the lapse clears it as part of its own compare-and-swap.

use std::time::Duration;

use tether_core::{
    ActiveRestraint, Capability, Engaged, EntityId, EntityType, GagType, LayerContent,
    LayerState, LockRequest, LockSlot, Observed, Padlock, Padlocked, RestraintLayers,
    TetherConfig, TetherError, TetherResult, Timestamp, Uid, Version, Versioned,
};
use tether_storage::StoreTrait;

use crate::{deny, retry_on_conflict, Authority, Enforcer};

// ============================================================================
// SURFACES
// ============================================================================

/// A lockable surface with numbered layers.
pub trait LockSurface {
    type Content: LayerContent;

    const RESOURCE: EntityType;
    const APPLY: Capability;
    const LOCK: Capability;
    const MAX_TIME: Capability;
    const UNLOCK: Capability;
    const REMOVE: Capability;

    /// Number of layers this deployment gives each identity.
    fn layers(config: &TetherConfig) -> u8;

    fn load<S: StoreTrait>(
        store: &S,
        owner: &Uid,
        layer: u8,
    ) -> TetherResult<Option<Versioned<LayerState<Self::Content>>>>;

    fn save<S: StoreTrait>(
        store: &S,
        owner: &Uid,
        layer: u8,
        expected: Option<Version>,
        state: &LayerState<Self::Content>,
    ) -> TetherResult<Version>;
}

/// Gag layers, holding a gag name.
#[derive(Debug, Clone, Copy)]
pub struct Gags;

/// Restriction layers, holding a restriction item id.
#[derive(Debug, Clone, Copy)]
pub struct Restrictions;

/// The single restraint-set slot. Its only layer is `0`.
#[derive(Debug, Clone, Copy)]
pub struct Restraints;

impl LockSurface for Gags {
    type Content = GagType;

    const RESOURCE: EntityType = EntityType::GagState;
    const APPLY: Capability = Capability::ApplyGags;
    const LOCK: Capability = Capability::LockGags;
    const MAX_TIME: Capability = Capability::MaxGagTime;
    const UNLOCK: Capability = Capability::UnlockGags;
    const REMOVE: Capability = Capability::RemoveGags;

    fn layers(config: &TetherConfig) -> u8 {
        config.gag_layers
    }

    fn load<S: StoreTrait>(
        store: &S,
        owner: &Uid,
        layer: u8,
    ) -> TetherResult<Option<Versioned<LayerState<GagType>>>> {
        store.gag_get(owner, layer)
    }

    fn save<S: StoreTrait>(
        store: &S,
        owner: &Uid,
        layer: u8,
        expected: Option<Version>,
        state: &LayerState<GagType>,
    ) -> TetherResult<Version> {
        store.gag_put(owner, layer, expected, state)
    }
}

impl LockSurface for Restrictions {
    type Content = EntityId;

    const RESOURCE: EntityType = EntityType::RestrictionState;
    const APPLY: Capability = Capability::ApplyRestrictions;
    const LOCK: Capability = Capability::LockRestrictions;
    const MAX_TIME: Capability = Capability::MaxRestrictionTime;
    const UNLOCK: Capability = Capability::UnlockRestrictions;
    const REMOVE: Capability = Capability::RemoveRestrictions;

    fn layers(config: &TetherConfig) -> u8 {
        config.restriction_layers
    }

    fn load<S: StoreTrait>(
        store: &S,
        owner: &Uid,
        layer: u8,
    ) -> TetherResult<Option<Versioned<LayerState<EntityId>>>> {
        store.restriction_get(owner, layer)
    }

    fn save<S: StoreTrait>(
        store: &S,
        owner: &Uid,
        layer: u8,
        expected: Option<Version>,
        state: &LayerState<EntityId>,
    ) -> TetherResult<Version> {
        store.restriction_put(owner, layer, expected, state)
    }
}

impl LockSurface for Restraints {
    type Content = ActiveRestraint;

    const RESOURCE: EntityType = EntityType::RestraintSetState;
    const APPLY: Capability = Capability::ApplyRestraintSets;
    const LOCK: Capability = Capability::LockRestraintSets;
    const MAX_TIME: Capability = Capability::MaxRestraintTime;
    const UNLOCK: Capability = Capability::UnlockRestraintSets;
    const REMOVE: Capability = Capability::RemoveRestraintSets;

    fn layers(_config: &TetherConfig) -> u8 {
        1
    }

    fn load<S: StoreTrait>(
        store: &S,
        owner: &Uid,
        _layer: u8,
    ) -> TetherResult<Option<Versioned<LayerState<ActiveRestraint>>>> {
        store.restraint_get(owner)
    }

    fn save<S: StoreTrait>(
        store: &S,
        owner: &Uid,
        _layer: u8,
        expected: Option<Version>,
        state: &LayerState<ActiveRestraint>,
    ) -> TetherResult<Version> {
        store.restraint_put(owner, expected, state)
    }
}

// ============================================================================
// SHARED PADLOCK RULES
// ============================================================================

/// Upper bound that applies to a timed padlock request.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LockBound {
    /// The wearer locking their own state
    SelfImposed,
    /// A partner bounded by a max-time grant
    Granted(Capability, Duration),
    /// Only the deployment-wide cap applies
    Unbounded,
}

/// Trust grant a partner needs before engaging `padlock`.
pub(crate) fn trust_capability(padlock: Padlock) -> Option<Capability> {
    if padlock.is_owner_class() {
        Some(Capability::OwnerLocks)
    } else if padlock.is_devotional_class() {
        Some(Capability::DevotionalLocks)
    } else if padlock == Padlock::Permanent {
        Some(Capability::PermanentLocks)
    } else {
        None
    }
}

/// What a non-assigner may open.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UnlockRights {
    /// The surface's unlock right
    pub unlock: bool,
    /// Trust to open owner-class padlocks
    pub owner_locks: bool,
}

/// Check who may open an engaged padlock, then the password.
pub(crate) fn check_unlock(
    engaged: &Padlocked<Engaged>,
    actor: &Uid,
    password: Option<&str>,
    rights: UnlockRights,
    resource: EntityType,
) -> TetherResult<()> {
    let padlock = engaged.padlock();
    let assigned = engaged.is_assigned_by(actor);
    let permitted = if padlock.is_devotional_class() {
        assigned
    } else if padlock.is_owner_class() {
        assigned || rights.owner_locks
    } else {
        assigned || rights.unlock
    };
    if !permitted {
        return Err(deny(actor, "unlock", resource));
    }
    engaged
        .check_password(password)
        .map_err(|e| e.into_tether(actor, resource))
}

/// Collapse a lapsed timed padlock to open. Returns whether it did.
pub(crate) fn settle_lock(lock: &mut LockSlot, now: Timestamp) -> bool {
    let (settled, cleared) = std::mem::take(lock).observe(now).settle();
    *lock = match settled {
        Ok(open) => open.into_slot(),
        Err(engaged) => engaged.into_slot(),
    };
    cleared
}

fn already_locked(resource: EntityType, lock: &LockSlot) -> TetherError {
    TetherError::invalid_transition(
        resource,
        lock.padlock.to_string(),
        "locked",
        "layer is already locked",
    )
}

// ============================================================================
// ENFORCER OPERATIONS
// ============================================================================

impl<S: StoreTrait> Enforcer<S> {
    fn check_layer<L: LockSurface>(&self, owner: &Uid, layer: u8) -> TetherResult<()> {
        if layer >= L::layers(&self.config) {
            return Err(TetherError::not_found(
                L::RESOURCE,
                format!("{}#{}", owner, layer),
            ));
        }
        Ok(())
    }

    /// Current row with any lapsed padlock already cleared in memory, and
    /// the version a write must expect.
    fn load_settled<L: LockSurface>(
        &self,
        owner: &Uid,
        layer: u8,
        now: Timestamp,
    ) -> TetherResult<(Option<Version>, LayerState<L::Content>)> {
        match L::load(&*self.store, owner, layer)? {
            Some(row) => {
                let mut state = row.data;
                settle_lock(&mut state.lock, now);
                Ok((Some(row.version), state))
            }
            None => Ok((None, LayerState::default())),
        }
    }

    /// Reject a timed request whose duration exceeds its bound.
    pub(crate) fn check_timer(
        &self,
        actor: &Uid,
        request: &LockRequest,
        bound: LockBound,
        resource: EntityType,
    ) -> TetherResult<()> {
        let duration = match request.duration {
            Some(d) if request.padlock.is_timed_class() => d,
            _ => return Ok(()),
        };
        let cap = match bound {
            LockBound::SelfImposed => self.config.max_self_lock_duration,
            _ => self.config.max_lock_duration,
        };
        if duration > cap {
            return Err(TetherError::invalid_value(
                "duration",
                format!("{:?} exceeds the configured maximum of {:?}", duration, cap),
            ));
        }
        if let LockBound::Granted(capability, limit) = bound {
            if duration > limit {
                return Err(deny(actor, capability.as_db_str(), resource));
            }
        }
        Ok(())
    }

    /// Put `content` on a layer.
    ///
    /// Re-applying what a locked layer already holds is a no-op; anything
    /// else on a locked layer is refused.
    pub fn apply<L: LockSurface>(
        &self,
        actor: &Uid,
        owner: &Uid,
        layer: u8,
        content: L::Content,
    ) -> TetherResult<Version> {
        self.check_layer::<L>(owner, layer)?;
        let authority = self.authority(actor, owner, L::RESOURCE)?;
        authority.require(actor, L::APPLY, L::RESOURCE)?;

        retry_on_conflict(self.attempts(), || {
            let (expected, mut state) = self.load_settled::<L>(owner, layer, self.now())?;
            if state.lock.is_locked() {
                if state.holds(&content) {
                    return Ok(expected.unwrap_or_default());
                }
                return Err(TetherError::invalid_transition(
                    L::RESOURCE,
                    state.lock.padlock.to_string(),
                    "applied",
                    "a different item is locked on this layer",
                ));
            }

            state.content = Some(content.clone());
            state.enabler = Some(actor.clone());
            let version = L::save(&*self.store, owner, layer, expected, &state)?;
            tracing::debug!(%actor, %owner, layer, resource = L::RESOURCE.table_name(), "Layer applied");
            Ok(version)
        })
    }

    /// Engage a padlock on an occupied layer.
    pub fn lock<L: LockSurface>(
        &self,
        actor: &Uid,
        owner: &Uid,
        layer: u8,
        request: LockRequest,
    ) -> TetherResult<Version> {
        self.check_layer::<L>(owner, layer)?;
        let authority = self.authority(actor, owner, L::RESOURCE)?;
        authority.require(actor, L::LOCK, L::RESOURCE)?;
        if let Some(trust) = trust_capability(request.padlock) {
            authority.require(actor, trust, L::RESOURCE)?;
        }
        let bound = match &authority {
            Authority::Own => LockBound::SelfImposed,
            Authority::Partner(grant) => LockBound::Granted(
                L::MAX_TIME,
                grant.get(L::MAX_TIME).as_duration().unwrap_or_default(),
            ),
        };
        self.check_timer(actor, &request, bound, L::RESOURCE)?;

        retry_on_conflict(self.attempts(), || {
            let now = self.now();
            let (expected, mut state) = self.load_settled::<L>(owner, layer, now)?;
            if state.lock.is_locked() {
                return Err(already_locked(L::RESOURCE, &state.lock));
            }
            if !state.is_occupied() {
                return Err(TetherError::invalid_transition(
                    L::RESOURCE,
                    "empty",
                    "locked",
                    "nothing is applied to lock",
                ));
            }

            state.lock = Padlocked::new()
                .engage(request.clone(), actor.clone(), now)
                .map_err(|e| e.into_tether(actor, L::RESOURCE))?
                .into_slot();
            let version = L::save(&*self.store, owner, layer, expected, &state)?;
            tracing::debug!(
                %actor,
                %owner,
                layer,
                resource = L::RESOURCE.table_name(),
                padlock = %request.padlock,
                "Padlock engaged"
            );
            Ok(version)
        })
    }

    /// Open a padlock.
    ///
    /// A lapsed timed padlock opens for anyone. Otherwise devotional locks
    /// open only for their assigner, owner locks for the assigner or a
    /// partner trusted with owner locks, and the rest for the assigner or a
    /// partner holding the surface's unlock grant.
    pub fn unlock<L: LockSurface>(
        &self,
        actor: &Uid,
        owner: &Uid,
        layer: u8,
        password: Option<&str>,
    ) -> TetherResult<Version> {
        self.check_layer::<L>(owner, layer)?;
        self.require_identity(owner)?;

        retry_on_conflict(self.attempts(), || {
            let (expected, mut state) = match L::load(&*self.store, owner, layer)? {
                Some(row) => (Some(row.version), row.data),
                None => (None, LayerState::default()),
            };
            match state.lock.clone().observe(self.now()) {
                Observed::Open(_) => {
                    return Err(TetherError::invalid_transition(
                        L::RESOURCE,
                        "unlocked",
                        "unlocked",
                        "layer is not locked",
                    ))
                }
                Observed::Lapsed(lapsed) => state.lock = lapsed.release().into_slot(),
                Observed::Engaged(engaged) => {
                    let rights = self.unlock_rights(actor, owner, L::UNLOCK)?;
                    check_unlock(&engaged, actor, password, rights, L::RESOURCE)?;
                    state.lock = engaged.release().into_slot();
                }
            }

            let version = L::save(&*self.store, owner, layer, expected, &state)?;
            tracing::debug!(%actor, %owner, layer, resource = L::RESOURCE.table_name(), "Padlock released");
            Ok(version)
        })
    }

    /// Take content off an unlocked layer.
    pub fn remove<L: LockSurface>(
        &self,
        actor: &Uid,
        owner: &Uid,
        layer: u8,
    ) -> TetherResult<Version> {
        self.check_layer::<L>(owner, layer)?;
        let authority = self.authority(actor, owner, L::RESOURCE)?;
        authority.require(actor, L::REMOVE, L::RESOURCE)?;

        retry_on_conflict(self.attempts(), || {
            let (expected, mut state) = self.load_settled::<L>(owner, layer, self.now())?;
            if state.lock.is_locked() {
                return Err(TetherError::invalid_transition(
                    L::RESOURCE,
                    state.lock.padlock.to_string(),
                    "removed",
                    "layer is locked",
                ));
            }
            if !state.is_occupied() {
                return Err(TetherError::invalid_transition(
                    L::RESOURCE,
                    "empty",
                    "removed",
                    "nothing is applied",
                ));
            }

            state.clear_content();
            let version = L::save(&*self.store, owner, layer, expected, &state)?;
            tracing::debug!(%actor, %owner, layer, resource = L::RESOURCE.table_name(), "Layer removed");
            Ok(version)
        })
    }

    /// Read a layer, clearing a lapsed padlock on the way.
    pub fn read_layer<L: LockSurface>(
        &self,
        owner: &Uid,
        layer: u8,
    ) -> TetherResult<LayerState<L::Content>> {
        self.check_layer::<L>(owner, layer)?;
        retry_on_conflict(self.attempts(), || {
            let row = match L::load(&*self.store, owner, layer)? {
                Some(row) => row,
                None => return Ok(LayerState::default()),
            };
            let mut state = row.data;
            if settle_lock(&mut state.lock, self.now()) {
                L::save(&*self.store, owner, layer, Some(row.version), &state)?;
                tracing::debug!(%owner, layer, resource = L::RESOURCE.table_name(), "Cleared lapsed padlock");
            }
            Ok(state)
        })
    }

    pub fn read_gag(&self, owner: &Uid, layer: u8) -> TetherResult<LayerState<GagType>> {
        self.read_layer::<Gags>(owner, layer)
    }

    pub fn read_restriction(&self, owner: &Uid, layer: u8) -> TetherResult<LayerState<EntityId>> {
        self.read_layer::<Restrictions>(owner, layer)
    }

    pub fn read_restraint(&self, owner: &Uid) -> TetherResult<LayerState<ActiveRestraint>> {
        self.read_layer::<Restraints>(owner, 0)
    }

    /// Change which sub-layers of the worn restraint set are active.
    pub fn set_restraint_layers(
        &self,
        actor: &Uid,
        owner: &Uid,
        layers: RestraintLayers,
    ) -> TetherResult<Version> {
        let resource = Restraints::RESOURCE;
        let authority = self.authority(actor, owner, resource)?;
        authority.require(actor, Capability::ApplyRestraintLayers, resource)?;

        let (expected, mut state) = self.load_settled::<Restraints>(owner, 0, self.now())?;
        if state.lock.is_locked() {
            authority.require(actor, Capability::ApplyLayersWhileLocked, resource)?;
        }
        let worn = state.content.as_mut().ok_or_else(|| {
            TetherError::invalid_transition(resource, "empty", "layered", "no restraint set is worn")
        })?;
        worn.layers = layers;

        let version = Restraints::save(&*self.store, owner, 0, expected, &state)?;
        tracing::debug!(%actor, %owner, layers = layers.bits(), "Restraint layers changed");
        Ok(version)
    }

    /// Unlock rights `actor` holds over `owner` beyond being the assigner.
    /// The owner themselves holds none.
    fn unlock_rights(
        &self,
        actor: &Uid,
        owner: &Uid,
        unlock: Capability,
    ) -> TetherResult<UnlockRights> {
        if actor == owner {
            return Ok(UnlockRights::default());
        }
        Ok(match self.store.grant_get(owner, actor)? {
            Some(row) => UnlockRights {
                unlock: row.data.allows(unlock),
                owner_locks: row.data.allows(Capability::OwnerLocks),
            },
            None => UnlockRights::default(),
        })
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::test_support::*;
    use proptest::prelude::*;
    use tether_core::GrantValue;

    fn arb_padlock() -> impl Strategy<Value = Padlock> {
        (0..Padlock::ALL.len()).prop_map(|i| Padlock::ALL[i])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Whatever a fully trusted partner asks for, every stored slot
        /// satisfies the lock invariant.
        #[test]
        fn prop_stored_slots_hold_invariant(
            padlock in arb_padlock(),
            password in proptest::option::of("[a-z]{0,6}"),
            secs in proptest::option::of(0u64..7200),
            unlock_first in any::<bool>(),
        ) {
            let h = harness();
            let (a, b) = h.pair("AB12345678", "ZZ99999999");
            h.grant_flags(&a, &b, &[
                Capability::ApplyGags,
                Capability::LockGags,
                Capability::UnlockGags,
                Capability::OwnerLocks,
                Capability::DevotionalLocks,
                Capability::PermanentLocks,
            ]);
            h.grant_value(&a, &b, Capability::MaxGagTime, GrantValue::Duration(Duration::from_secs(3600)));
            h.enforcer.apply::<Gags>(&b, &a, 0, GagType::new("Ball Gag").unwrap()).unwrap();

            let request = LockRequest {
                padlock,
                password: password.clone(),
                duration: secs.map(Duration::from_secs),
            };
            let _ = h.enforcer.lock::<Gags>(&b, &a, 0, request);
            if unlock_first {
                let _ = h.enforcer.unlock::<Gags>(&b, &a, 0, password.as_deref());
            }
            let stored = h.enforcer.store().gag_get(&a, 0).unwrap().unwrap();
            prop_assert!(stored.data.lock.check().is_ok());
        }
    }
}
