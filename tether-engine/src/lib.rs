//! Tether Engine - Consistency Enforcer
//!
//! Every mutation an actor requests on another identity's state passes
//! through [`Enforcer`]: the pair edge is looked up, the owner's grant row is
//! consulted (and the access row for permission edits), the lock state
//! machine is applied, and the result is written with compare-and-swap.
//!
//! The enforcer itself holds no mutable state. Operations are split across
//! modules by surface:
//!
//! | Module | Operations |
//! |--------|------------|
//! | `pairs` | identity registration, pairing, unpairing, identity deletion |
//! | `resolver` | grant reads and writes, access writes |
//! | `layers` | gag / restriction / restraint-set apply, lock, unlock, remove |
//! | `hardcore` | forced-behavior overrides |
//! | `collar` | collar requests, ownership and collar edits |
//! | `globals` | self-scoped global permission edits |
//! | `authorize` | stateless checks for relayed puppet, mood, toybox and shock commands |

mod authorize;
mod collar;
mod globals;
mod hardcore;
mod layers;
mod pairs;
mod resolver;
mod retry;

pub use authorize::{ShockBounds, ShockInstruction};
pub use layers::{Gags, LockSurface, Restraints, Restrictions};
pub use retry::retry_on_conflict;

use std::sync::Arc;

use tether_core::{
    Capability, CapabilityGrant, Clock, EntityType, TetherConfig, TetherError, TetherResult,
    Timestamp, Uid,
};
use tether_storage::StoreTrait;

// ============================================================================
// ENFORCER
// ============================================================================

/// The consistency enforcer over a store.
pub struct Enforcer<S: StoreTrait> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: TetherConfig,
}

impl<S: StoreTrait> Enforcer<S> {
    /// Create an enforcer. Fails if `config` does not validate.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: TetherConfig) -> TetherResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Total attempts for operations that re-read after losing a race.
    pub(crate) fn attempts(&self) -> u32 {
        self.config.conflict_retries.saturating_add(1)
    }

    /// Work out in what capacity `actor` acts on `owner`'s state.
    ///
    /// Acting on oneself needs no edge. Otherwise the grant row
    /// `(owner, actor)` must exist; an unpaired actor is denied.
    pub(crate) fn authority(
        &self,
        actor: &Uid,
        owner: &Uid,
        resource: EntityType,
    ) -> TetherResult<Authority> {
        if actor == owner {
            self.require_identity(owner)?;
            return Ok(Authority::Own);
        }
        match self.store.grant_get(owner, actor)? {
            Some(row) => Ok(Authority::Partner(Box::new(row.data))),
            None => Err(deny(actor, "act without a pairing", resource)),
        }
    }

    pub(crate) fn require_identity(&self, uid: &Uid) -> TetherResult<()> {
        match self.store.user_get(uid)? {
            Some(_) => Ok(()),
            None => Err(TetherError::not_found(EntityType::User, uid)),
        }
    }
}

// ============================================================================
// AUTHORITY
// ============================================================================

/// Capacity in which an actor touches an owner's state.
#[derive(Debug, Clone)]
pub(crate) enum Authority {
    /// The actor is the owner.
    Own,
    /// The actor is a paired partner; carries `Grant[owner, actor]`.
    Partner(Box<CapabilityGrant>),
}

impl Authority {
    pub(crate) fn is_own(&self) -> bool {
        matches!(self, Authority::Own)
    }

    /// Self actions pass every grant check.
    pub(crate) fn allows(&self, capability: Capability) -> bool {
        match self {
            Authority::Own => true,
            Authority::Partner(grant) => grant.allows(capability),
        }
    }

    pub(crate) fn grant(&self) -> Option<&CapabilityGrant> {
        match self {
            Authority::Own => None,
            Authority::Partner(grant) => Some(grant.as_ref()),
        }
    }

    /// Fail with `PermissionDenied` unless `capability` is allowed.
    pub(crate) fn require(
        &self,
        actor: &Uid,
        capability: Capability,
        resource: EntityType,
    ) -> TetherResult<()> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(deny(actor, capability.as_db_str(), resource))
        }
    }
}

/// Build a permission denial, logging it at debug level.
pub(crate) fn deny(actor: &Uid, action: &str, resource: EntityType) -> TetherError {
    tracing::debug!(
        %actor,
        action,
        resource = resource.table_name(),
        "Permission denied"
    );
    TetherError::permission_denied(actor, action, resource.table_name())
}

// ============================================================================
// TEST SUPPORT
// ============================================================================
