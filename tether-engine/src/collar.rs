//! Collar subsystem: requests, the ownership graph and collar edits.
//!
//! The collar row belongs to the wearer. Owners are a separate many-to-one
//! edge set; the earliest edge is the primary owner. What the wearer may
//! still edit is `edit_access`, what owners may edit is `owner_edit_access`.
//! The `PADLOCK` bit in either mask stands in for the lock and unlock grants
//! of the layer surfaces.

use tether_core::{
    primary_owner, Capability, CollarAccess, CollarChange, CollarData, CollarOwner, CollarRequest,
    EntityType, LockRequest, Observed, OwnerRemovalPolicy, Padlocked, StorageError, TetherError,
    TetherResult, Uid, ValidationError, Version, Versioned,
};
use tether_storage::{CollarAcceptance, OwnerRemoval, StoreTrait};

use crate::layers::{check_unlock, settle_lock, trust_capability, LockBound, UnlockRights};
use crate::{deny, retry_on_conflict, Enforcer};

const RESOURCE: EntityType = EntityType::CollarState;

/// How an actor relates to a collar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CollarRole {
    Wearer,
    Owner { primary: bool },
    Outsider,
}

fn role_of(actor: &Uid, wearer: &Uid, owners: &[CollarOwner]) -> CollarRole {
    if actor == wearer {
        return CollarRole::Wearer;
    }
    if owners.iter().any(|o| &o.owner == actor) {
        let primary = primary_owner(owners).is_some_and(|p| &p.owner == actor);
        return CollarRole::Owner { primary };
    }
    CollarRole::Outsider
}

impl<S: StoreTrait> Enforcer<S> {
    fn collar_row(&self, wearer: &Uid) -> TetherResult<Versioned<CollarData>> {
        self.store
            .collar_get(wearer)?
            .ok_or_else(|| TetherError::not_found(RESOURCE, wearer))
    }

    /// An owner no longer paired with the wearer keeps the edge but acts as
    /// an outsider.
    fn collar_role(
        &self,
        actor: &Uid,
        wearer: &Uid,
        owners: &[CollarOwner],
    ) -> TetherResult<CollarRole> {
        let role = role_of(actor, wearer, owners);
        if matches!(role, CollarRole::Owner { .. })
            && self.store.pair_edge_get(wearer, actor)?.is_none()
        {
            return Ok(CollarRole::Outsider);
        }
        Ok(role)
    }

    fn require_paired(&self, wearer: &Uid, other: &Uid, action: &str) -> TetherResult<()> {
        match self.store.pair_edge_get(wearer, other)? {
            Some(_) => Ok(()),
            None => Err(deny(other, action, EntityType::CollarRequest)),
        }
    }

    // === Requests ===

    /// Offer to collar `wearer`. The two must be paired.
    pub fn request_collar(
        &self,
        requester: &Uid,
        wearer: &Uid,
        terms: impl Into<String>,
        is_temporary: bool,
        owner_access: CollarAccess,
    ) -> TetherResult<CollarRequest> {
        if requester == wearer {
            return Err(ValidationError::InvalidValue {
                field: "wearer".to_string(),
                reason: "an identity cannot collar itself".to_string(),
            }
            .into());
        }
        self.require_paired(wearer, requester, "request_collar")?;
        if self
            .store
            .collar_owners(wearer)?
            .iter()
            .any(|o| &o.owner == requester)
        {
            return Err(StorageError::AlreadyExists {
                entity_type: EntityType::CollarOwner,
                key: format!("{}->{}", requester, wearer),
            }
            .into());
        }

        let request = CollarRequest {
            requester: requester.clone(),
            wearer: wearer.clone(),
            created_at: self.now(),
            terms: terms.into(),
            is_temporary,
            initial_owner_access: owner_access,
        };
        self.store.collar_request_insert(&request)?;
        tracing::debug!(%requester, %wearer, is_temporary, "Collar requested");
        Ok(request)
    }

    /// Accept a pending request, creating the collar on first acceptance.
    pub fn accept_collar(&self, wearer: &Uid, requester: &Uid) -> TetherResult<CollarAcceptance> {
        self.require_paired(wearer, requester, "accept_collar")?;
        let accepted = self.store.collar_accept(requester, wearer, self.now())?;
        tracing::info!(
            %wearer,
            owner = %requester,
            collar_created = accepted.collar_created,
            "Collar owner added"
        );
        Ok(accepted)
    }

    pub fn decline_collar(&self, wearer: &Uid, requester: &Uid) -> TetherResult<CollarRequest> {
        self.store.collar_request_remove(requester, wearer)
    }

    pub fn cancel_collar_request(
        &self,
        requester: &Uid,
        wearer: &Uid,
    ) -> TetherResult<CollarRequest> {
        self.store.collar_request_remove(requester, wearer)
    }

    pub fn pending_collar_requests(&self, wearer: &Uid) -> TetherResult<Vec<CollarRequest>> {
        self.store.collar_requests_for(wearer)
    }

    // === Reads ===

    /// The wearer's collar, clearing a lapsed padlock on the way.
    pub fn read_collar(&self, wearer: &Uid) -> TetherResult<Option<CollarData>> {
        retry_on_conflict(self.attempts(), || {
            let row = match self.store.collar_get(wearer)? {
                Some(row) => row,
                None => return Ok(None),
            };
            let mut collar = row.data;
            if settle_lock(&mut collar.lock, self.now()) {
                self.store.collar_update(row.version, &collar)?;
                tracing::debug!(%wearer, "Cleared lapsed collar padlock");
            }
            Ok(Some(collar))
        })
    }

    /// Owners of `wearer`'s collar, primary owner first.
    pub fn collar_owners(&self, wearer: &Uid) -> TetherResult<Vec<CollarOwner>> {
        self.store.collar_owners(wearer)
    }

    // === Edits ===

    /// Change one decorative field.
    pub fn set_collar_field(
        &self,
        actor: &Uid,
        wearer: &Uid,
        change: CollarChange,
    ) -> TetherResult<Version> {
        let row = self.collar_row(wearer)?;
        let owners = self.store.collar_owners(wearer)?;
        let mut collar = row.data;
        settle_lock(&mut collar.lock, self.now());

        let needed = change.required_access();
        match self.collar_role(actor, wearer, &owners)? {
            CollarRole::Wearer => {
                if !collar.edit_access.contains(needed) {
                    return Err(deny(actor, "edit own collar", RESOURCE));
                }
                if collar.lock.is_locked() {
                    return Err(TetherError::invalid_transition(
                        RESOURCE,
                        collar.lock.padlock.to_string(),
                        "edited",
                        "collar is locked",
                    ));
                }
            }
            CollarRole::Owner { .. } => {
                if !collar.owner_edit_access.contains(needed) {
                    return Err(deny(actor, "edit collar", RESOURCE));
                }
            }
            CollarRole::Outsider => return Err(deny(actor, "edit collar", RESOURCE)),
        }

        change.apply_to(&mut collar);
        let version = self.store.collar_update(row.version, &collar)?;
        tracing::debug!(%actor, %wearer, version, "Collar edited");
        Ok(version)
    }

    /// Replace either access mask. Owners set `edit_access`; the wearer or
    /// the primary owner sets `owner_edit_access`.
    pub fn set_collar_access(
        &self,
        actor: &Uid,
        wearer: &Uid,
        edit_access: Option<CollarAccess>,
        owner_edit_access: Option<CollarAccess>,
    ) -> TetherResult<Version> {
        if edit_access.is_none() && owner_edit_access.is_none() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "edit_access".to_string(),
            }
            .into());
        }
        let row = self.collar_row(wearer)?;
        let owners = self.store.collar_owners(wearer)?;
        let role = self.collar_role(actor, wearer, &owners)?;

        let mut collar = row.data;
        if let Some(access) = edit_access {
            if !matches!(role, CollarRole::Owner { .. }) {
                return Err(deny(actor, "set edit_access", RESOURCE));
            }
            collar.edit_access = access;
        }
        if let Some(access) = owner_edit_access {
            if !matches!(role, CollarRole::Wearer | CollarRole::Owner { primary: true }) {
                return Err(deny(actor, "set owner_edit_access", RESOURCE));
            }
            collar.owner_edit_access = access;
        }

        let version = self.store.collar_update(row.version, &collar)?;
        tracing::debug!(%actor, %wearer, version, "Collar access changed");
        Ok(version)
    }

    // === Padlock ===

    pub fn lock_collar(
        &self,
        actor: &Uid,
        wearer: &Uid,
        request: LockRequest,
    ) -> TetherResult<Version> {
        let row = self.collar_row(wearer)?;
        let owners = self.store.collar_owners(wearer)?;
        let mut collar = row.data;

        let bound = match self.collar_role(actor, wearer, &owners)? {
            CollarRole::Wearer if collar.edit_access.contains(CollarAccess::PADLOCK) => {
                LockBound::SelfImposed
            }
            CollarRole::Owner { .. } if collar.owner_edit_access.contains(CollarAccess::PADLOCK) => {
                if let Some(trust) = trust_capability(request.padlock) {
                    if !self.partner_allows(wearer, actor, trust)? {
                        return Err(deny(actor, trust.as_db_str(), RESOURCE));
                    }
                }
                LockBound::Unbounded
            }
            _ => return Err(deny(actor, "lock collar", RESOURCE)),
        };
        self.check_timer(actor, &request, bound, RESOURCE)?;

        let now = self.now();
        settle_lock(&mut collar.lock, now);
        if collar.lock.is_locked() {
            return Err(TetherError::invalid_transition(
                RESOURCE,
                collar.lock.padlock.to_string(),
                "locked",
                "collar is already locked",
            ));
        }
        let padlock = request.padlock;
        collar.lock = Padlocked::new()
            .engage(request, actor.clone(), now)
            .map_err(|e| e.into_tether(actor, RESOURCE))?
            .into_slot();

        let version = self.store.collar_update(row.version, &collar)?;
        tracing::debug!(%actor, %wearer, padlock = %padlock, "Collar padlock engaged");
        Ok(version)
    }

    pub fn unlock_collar(
        &self,
        actor: &Uid,
        wearer: &Uid,
        password: Option<&str>,
    ) -> TetherResult<Version> {
        let row = self.collar_row(wearer)?;
        let mut collar = row.data;

        match collar.lock.clone().observe(self.now()) {
            Observed::Open(_) => {
                return Err(TetherError::invalid_transition(
                    RESOURCE,
                    "unlocked",
                    "unlocked",
                    "collar is not locked",
                ))
            }
            Observed::Lapsed(lapsed) => collar.lock = lapsed.release().into_slot(),
            Observed::Engaged(engaged) => {
                let owners = self.store.collar_owners(wearer)?;
                let rights = match self.collar_role(actor, wearer, &owners)? {
                    CollarRole::Owner { .. } => UnlockRights {
                        unlock: collar.owner_edit_access.contains(CollarAccess::PADLOCK),
                        owner_locks: self.partner_allows(wearer, actor, Capability::OwnerLocks)?,
                    },
                    CollarRole::Wearer | CollarRole::Outsider => UnlockRights::default(),
                };
                check_unlock(&engaged, actor, password, rights, RESOURCE)?;
                collar.lock = engaged.release().into_slot();
            }
        }

        let version = self.store.collar_update(row.version, &collar)?;
        tracing::debug!(%actor, %wearer, "Collar padlock released");
        Ok(version)
    }

    fn partner_allows(&self, owner: &Uid, partner: &Uid, capability: Capability) -> TetherResult<bool> {
        Ok(self
            .store
            .grant_get(owner, partner)?
            .is_some_and(|row| row.data.allows(capability)))
    }

    // === Ownership ===

    /// Add another owner. The primary owner may always do this, other owners
    /// only while `owner_edit_access` has `OWNERS`.
    pub fn add_co_owner(
        &self,
        actor: &Uid,
        wearer: &Uid,
        new_owner: &Uid,
    ) -> TetherResult<CollarOwner> {
        let collar = self.collar_row(wearer)?.data;
        let owners = self.store.collar_owners(wearer)?;
        let permitted = match self.collar_role(actor, wearer, &owners)? {
            CollarRole::Owner { primary: true } => true,
            CollarRole::Owner { primary: false } => {
                collar.owner_edit_access.contains(CollarAccess::OWNERS)
            }
            _ => false,
        };
        if !permitted {
            return Err(deny(actor, "add collar owner", EntityType::CollarOwner));
        }
        if self.store.pair_edge_get(wearer, new_owner)?.is_none() {
            return Err(StorageError::Integrity {
                entity_type: EntityType::CollarOwner,
                reason: format!("{} is not paired with {}", new_owner, wearer),
            }
            .into());
        }

        let edge = CollarOwner {
            owner: new_owner.clone(),
            collared: wearer.clone(),
            created_at: self.now(),
        };
        self.store.collar_owner_add(&edge)?;
        tracing::info!(%actor, %wearer, owner = %new_owner, "Collar co-owner added");
        Ok(edge)
    }

    /// Remove an owner edge. The owner themselves, the wearer or the
    /// primary owner may do this; the last owner follows the configured
    /// removal policy.
    pub fn remove_owner(
        &self,
        actor: &Uid,
        wearer: &Uid,
        owner: &Uid,
    ) -> TetherResult<OwnerRemoval> {
        let owners = self.store.collar_owners(wearer)?;
        let permitted = actor == owner
            || matches!(
                self.collar_role(actor, wearer, &owners)?,
                CollarRole::Wearer | CollarRole::Owner { primary: true }
            );
        if !permitted {
            return Err(deny(actor, "remove collar owner", EntityType::CollarOwner));
        }
        self.remove_owner_with(wearer, owner, self.config.owner_removal_policy)
    }

    /// Administrative removal: always succeeds, deleting the collar when
    /// the last owner leaves.
    pub fn force_remove_owner(&self, wearer: &Uid, owner: &Uid) -> TetherResult<OwnerRemoval> {
        self.remove_owner_with(wearer, owner, OwnerRemovalPolicy::Cascade)
    }

    fn remove_owner_with(
        &self,
        wearer: &Uid,
        owner: &Uid,
        policy: OwnerRemovalPolicy,
    ) -> TetherResult<OwnerRemoval> {
        let removal = self.store.collar_owner_remove(wearer, owner, policy)?;
        tracing::info!(
            %wearer,
            %owner,
            policy = %policy,
            remaining = removal.remaining_owners,
            collar_removed = removal.collar_removed,
            "Collar owner removed"
        );
        Ok(removal)
    }
}
