//! Global permission edits.
//!
//! Globals are self-scoped toggles. They are never read as a fallback for a
//! missing pair grant; the shock ceilings are the one place a global value
//! narrows what a grant allows.

use tether_core::{
    Capability, EntityType, GlobalChange, GlobalPermissions, TetherError, TetherResult, Uid,
    Version, Versioned, MAX_INTENSITY,
};
use tether_storage::StoreTrait;

use crate::{deny, Authority, Enforcer};

const RESOURCE: EntityType = EntityType::GlobalPermissions;

impl<S: StoreTrait> Enforcer<S> {
    pub fn read_globals(&self, uid: &Uid) -> TetherResult<GlobalPermissions> {
        Ok(self.globals_row(uid)?.data)
    }

    fn globals_row(&self, uid: &Uid) -> TetherResult<Versioned<GlobalPermissions>> {
        self.store
            .globals_get(uid)?
            .ok_or_else(|| TetherError::not_found(RESOURCE, uid))
    }

    /// Apply one change to `uid`'s globals.
    ///
    /// The owner may change anything except switching off or unlocking a
    /// locked garbler. A partner holding `garbler_channels_editing` may edit
    /// the garbler channel set and release the garbler lock, nothing else.
    pub fn update_globals(
        &self,
        actor: &Uid,
        uid: &Uid,
        change: GlobalChange,
    ) -> TetherResult<Version> {
        if let GlobalChange::MaxShockIntensity(intensity) = change {
            if intensity > MAX_INTENSITY {
                return Err(TetherError::invalid_value(
                    "max_shock_intensity",
                    format!("{} exceeds {}", intensity, MAX_INTENSITY),
                ));
            }
        }

        let field = change.field_name();
        match self.authority(actor, uid, RESOURCE)? {
            Authority::Own => {}
            authority @ Authority::Partner(_) => {
                if !matches!(
                    change,
                    GlobalChange::AllowedGarblerChannels(_) | GlobalChange::ChatGarblerLocked(false)
                ) {
                    return Err(deny(actor, field, RESOURCE));
                }
                authority.require(actor, Capability::GarblerChannelsEditing, RESOURCE)?;
            }
        }

        let row = self.globals_row(uid)?;
        let mut globals = row.data;
        if globals.chat_garbler_locked && actor == uid {
            match change {
                GlobalChange::ChatGarblerActive(false) => {
                    return Err(TetherError::invalid_transition(
                        RESOURCE,
                        "garbler locked",
                        "garbler inactive",
                        "the chat garbler is locked on",
                    ))
                }
                GlobalChange::ChatGarblerLocked(false) => {
                    return Err(deny(actor, "unlock own chat garbler", RESOURCE))
                }
                _ => {}
            }
        }

        change.apply_to(&mut globals);
        let version = self.store.globals_update(row.version, &globals)?;
        tracing::debug!(%actor, %uid, field, version, "Globals updated");
        Ok(version)
    }
}
