//! Capability grant resolver.
//!
//! `Grant[owner, partner]` says what `owner` lets `partner` do. The owner
//! edits it freely; the partner edits a field only while
//! `Access[owner, partner]` has that field's bit. Only the owner edits the
//! access row, so a partner can never widen their own reach.

use tether_core::{
    Capability, CapabilityGrant, EntityType, GrantAccess, GrantValue, TetherError, TetherResult,
    Uid, Version, Versioned,
};
use tether_storage::StoreTrait;

use crate::{deny, Enforcer};

fn edge_key(owner: &Uid, partner: &Uid) -> String {
    format!("{}->{}", owner, partner)
}

impl<S: StoreTrait> Enforcer<S> {
    /// Current value of `capability` on `Grant[owner, partner]`.
    ///
    /// There is no fallback: without a pair edge the answer is `NotFound`.
    pub fn resolve(
        &self,
        owner: &Uid,
        partner: &Uid,
        capability: Capability,
    ) -> TetherResult<GrantValue> {
        Ok(self.grant_snapshot(owner, partner)?.data.get(capability))
    }

    /// Versioned read of the whole grant row.
    pub fn grant_snapshot(
        &self,
        owner: &Uid,
        partner: &Uid,
    ) -> TetherResult<Versioned<CapabilityGrant>> {
        self.store
            .grant_get(owner, partner)?
            .ok_or_else(|| TetherError::not_found(EntityType::PairEdge, edge_key(owner, partner)))
    }

    /// Versioned read of the access row.
    pub fn access_snapshot(
        &self,
        owner: &Uid,
        partner: &Uid,
    ) -> TetherResult<Versioned<GrantAccess>> {
        self.store
            .access_get(owner, partner)?
            .ok_or_else(|| TetherError::not_found(EntityType::PairEdge, edge_key(owner, partner)))
    }

    /// Write one capability on the latest version of `Grant[owner, partner]`.
    pub fn set_grant(
        &self,
        actor: &Uid,
        owner: &Uid,
        partner: &Uid,
        capability: Capability,
        value: GrantValue,
    ) -> TetherResult<Version> {
        let version = self.grant_snapshot(owner, partner)?.version;
        self.set_grant_at(actor, owner, partner, version, capability, value)
    }

    /// Write one capability, requiring the row to still be at `expected`.
    pub fn set_grant_at(
        &self,
        actor: &Uid,
        owner: &Uid,
        partner: &Uid,
        expected: Version,
        capability: Capability,
        value: GrantValue,
    ) -> TetherResult<Version> {
        let row = self.grant_snapshot(owner, partner)?;
        if actor != owner {
            let delegated = actor == partner
                && self.access_snapshot(owner, partner)?.data.allows(capability);
            if !delegated {
                return Err(deny(actor, capability.as_db_str(), EntityType::CapabilityGrant));
            }
        }

        let mut grant = row.data;
        grant.set(capability, value)?;
        let version = self.store.grant_update(expected, &grant)?;
        tracing::debug!(
            %actor,
            %owner,
            %partner,
            capability = capability.as_db_str(),
            version,
            "Grant updated"
        );
        Ok(version)
    }

    /// Allow or forbid the partner editing `capability` on their own grant.
    /// Only the owner may do this.
    pub fn set_access(
        &self,
        actor: &Uid,
        owner: &Uid,
        partner: &Uid,
        capability: Capability,
        editable: bool,
    ) -> TetherResult<Version> {
        let row = self.access_snapshot(owner, partner)?;
        if actor != owner {
            return Err(deny(actor, capability.as_db_str(), EntityType::GrantAccess));
        }

        let mut access = row.data;
        access.editable.set(capability, editable);
        let version = self.store.access_update(row.version, &access)?;
        tracing::debug!(
            %owner,
            %partner,
            capability = capability.as_db_str(),
            editable,
            version,
            "Grant access updated"
        );
        Ok(version)
    }
}
