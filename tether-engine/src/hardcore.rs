//! Hardcore overrides: independently timed forced behaviors.

use tether_core::{
    ActiveOverride, Capability, EntityType, HardcoreField, HardcoreState, OverrideValue,
    TetherError, TetherResult, Timestamp, Uid, Version,
};
use tether_storage::StoreTrait;

use crate::{deny, retry_on_conflict, Authority, Enforcer};

const RESOURCE: EntityType = EntityType::HardcoreState;

impl<S: StoreTrait> Enforcer<S> {
    /// Impose an override on `owner`. The slot is implied by `value`.
    ///
    /// Only paired partners impose overrides. An active slot may be
    /// replaced only by whoever set it.
    pub fn set_override(
        &self,
        actor: &Uid,
        owner: &Uid,
        value: OverrideValue,
        expires_at: Option<Timestamp>,
    ) -> TetherResult<Version> {
        value.validate()?;
        let field = value.field();
        let grant = match self.authority(actor, owner, RESOURCE)? {
            Authority::Own => return Err(deny(actor, "impose an override on oneself", RESOURCE)),
            Authority::Partner(grant) => grant,
        };
        if !value.satisfied_by().iter().any(|cap| grant.allows(*cap)) {
            return Err(deny(actor, field.capability().as_db_str(), RESOURCE));
        }

        let now = self.now();
        if let Some(at) = expires_at {
            if at <= now {
                return Err(TetherError::invalid_value(
                    "expires_at",
                    "expiry must be in the future",
                ));
            }
        }
        if field == HardcoreField::HypnoticEffect {
            let at = expires_at.ok_or_else(|| {
                TetherError::invalid_value("expires_at", "a hypnotic effect needs an expiry")
            })?;
            let limit = grant.hardcore.max_hypnosis_time;
            let within = (at - now).to_std().map(|d| d <= limit).unwrap_or(false);
            if !within {
                return Err(deny(actor, Capability::MaxHypnosisTime.as_db_str(), RESOURCE));
            }
        }

        let (expected, mut state) = match self.store.hardcore_get(owner)? {
            Some(row) => (Some(row.version), row.data),
            None => (None, HardcoreState::new(owner.clone())),
        };
        state.clear_lapsed(now);
        if let Some(active) = state.slot(field) {
            if &active.assigner != actor {
                return Err(TetherError::invalid_transition(
                    RESOURCE,
                    field.as_db_str(),
                    field.as_db_str(),
                    format!("already set by {}", active.assigner),
                ));
            }
        }
        *state.slot_mut(field) = Some(ActiveOverride {
            value,
            assigner: actor.clone(),
            expires_at,
        });

        let version = self.store.hardcore_put(expected, &state)?;
        tracing::debug!(%actor, %owner, field = field.as_db_str(), "Override set");
        Ok(version)
    }

    /// Lift an override. Its assigner may always do so; anyone may once it
    /// has lapsed.
    pub fn clear_override(
        &self,
        actor: &Uid,
        owner: &Uid,
        field: HardcoreField,
    ) -> TetherResult<Version> {
        self.require_identity(owner)?;
        let inactive = || {
            TetherError::invalid_transition(
                RESOURCE,
                "inactive",
                "inactive",
                format!("{} is not set", field),
            )
        };
        let row = self.store.hardcore_get(owner)?.ok_or_else(inactive)?;
        let now = self.now();
        let mut state = row.data;
        match state.slot(field) {
            None => return Err(inactive()),
            Some(active) if active.is_lapsed(now) || &active.assigner == actor => {}
            Some(_) => return Err(deny(actor, "clear_override", RESOURCE)),
        }
        state.clear_lapsed(now);
        *state.slot_mut(field) = None;

        let version = self.store.hardcore_put(Some(row.version), &state)?;
        tracing::debug!(%actor, %owner, field = field.as_db_str(), "Override cleared");
        Ok(version)
    }

    /// Read `owner`'s overrides, clearing lapsed slots with one write.
    pub fn read_hardcore(&self, owner: &Uid) -> TetherResult<HardcoreState> {
        retry_on_conflict(self.attempts(), || {
            let row = match self.store.hardcore_get(owner)? {
                Some(row) => row,
                None => {
                    self.require_identity(owner)?;
                    return Ok(HardcoreState::new(owner.clone()));
                }
            };
            let mut state = row.data;
            let cleared = state.clear_lapsed(self.now());
            if !cleared.is_empty() {
                self.store.hardcore_put(Some(row.version), &state)?;
                tracing::debug!(%owner, cleared = cleared.len(), "Cleared lapsed overrides");
            }
            Ok(state)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use std::time::Duration;
    use tether_core::{
        Capability, Clock, ConfinementAddress, ErrorKind, GrantValue, HardcoreField,
        OverrideValue, SIT_EMOTE_ID,
    };
    use tether_storage::StoreTrait;

    fn in_hours(h: &Harness, hours: i64) -> Option<tether_core::Timestamp> {
        Some(h.clock.now() + chrono::Duration::hours(hours))
    }

    #[test]
    fn test_override_requires_grant() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        let err = h
            .enforcer
            .set_override(&b, &a, OverrideValue::LockedFollowing, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        h.grant_flags(&a, &b, &[Capability::AllowLockedFollowing]);
        h.enforcer
            .set_override(&b, &a, OverrideValue::LockedFollowing, None)
            .unwrap();
        let state = h.enforcer.read_hardcore(&a).unwrap();
        assert_eq!(state.locked_following.unwrap().assigner, b);
    }

    #[test]
    fn test_self_override_denied() {
        let h = harness();
        let a = h.user("AB12345678");
        let err = h
            .enforcer
            .set_override(&a, &a, OverrideValue::ChatInputBlocked, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_sit_emote_accepts_sitting_grant() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_flags(&a, &b, &[Capability::AllowLockedSitting]);

        let dance = OverrideValue::LockedEmote {
            emote_id: 101,
            cycle_pose: 0,
        };
        assert_eq!(
            h.enforcer.set_override(&b, &a, dance, None).unwrap_err().kind(),
            ErrorKind::PermissionDenied
        );
        let sit = OverrideValue::LockedEmote {
            emote_id: SIT_EMOTE_ID,
            cycle_pose: 1,
        };
        h.enforcer.set_override(&b, &a, sit, None).unwrap();
    }

    #[test]
    fn test_expiry_must_be_future() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_flags(&a, &b, &[Capability::AllowHidingChatBoxes]);
        let err = h
            .enforcer
            .set_override(&b, &a, OverrideValue::ChatBoxesHidden, Some(h.clock.now()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_hypnosis_bounded_by_grant() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_flags(&a, &b, &[Capability::AllowHypnosisSending]);
        h.grant_value(
            &a,
            &b,
            Capability::MaxHypnosisTime,
            GrantValue::Duration(Duration::from_secs(3600)),
        );
        let effect = || OverrideValue::HypnoticEffect {
            descriptor: serde_json::json!({ "spiral": "pink", "speed": 2 }),
        };

        assert_eq!(
            h.enforcer.set_override(&b, &a, effect(), None).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            h.enforcer
                .set_override(&b, &a, effect(), in_hours(&h, 2))
                .unwrap_err()
                .kind(),
            ErrorKind::PermissionDenied
        );
        h.enforcer
            .set_override(&b, &a, effect(), in_hours(&h, 1))
            .unwrap();
    }

    #[test]
    fn test_only_assigner_replaces_active_slot() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        let c = h.user("CC00000000");
        h.enforcer.create_pair(&a, &c).unwrap();
        h.grant_flags(&a, &b, &[Capability::AllowIndoorConfinement]);
        h.grant_flags(&a, &c, &[Capability::AllowIndoorConfinement]);
        let address = || {
            OverrideValue::IndoorConfinement(ConfinementAddress {
                world: 74,
                zone: 339,
                ward: 12,
                plot: 7,
                apartment: false,
                subdivision: false,
            })
        };

        h.enforcer.set_override(&b, &a, address(), None).unwrap();
        assert_eq!(
            h.enforcer.set_override(&c, &a, address(), None).unwrap_err().kind(),
            ErrorKind::InvalidStateTransition
        );
        h.enforcer.set_override(&b, &a, address(), in_hours(&h, 1)).unwrap();
    }

    #[test]
    fn test_fields_are_independent() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_flags(
            &a,
            &b,
            &[Capability::AllowHidingChatInput, Capability::AllowChatInputBlocking],
        );
        h.enforcer
            .set_override(&b, &a, OverrideValue::ChatInputHidden, in_hours(&h, 1))
            .unwrap();
        h.enforcer
            .set_override(&b, &a, OverrideValue::ChatInputBlocked, None)
            .unwrap();

        h.clock.advance(Duration::from_secs(3601));
        let state = h.enforcer.read_hardcore(&a).unwrap();
        assert!(state.chat_input_hidden.is_none());
        assert!(state.chat_input_blocked.is_some());
        assert_eq!(
            h.enforcer.store().hardcore_get(&a).unwrap().unwrap().version,
            3
        );
    }

    #[test]
    fn test_clear_override_rules() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_flags(&a, &b, &[Capability::AllowImprisonment]);
        let prison = OverrideValue::Imprisonment {
            territory: 132,
            position: [1.0, 2.0, 3.0],
            radius: 5.0,
        };

        assert_eq!(
            h.enforcer
                .clear_override(&b, &a, HardcoreField::Imprisonment)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidStateTransition
        );
        h.enforcer
            .set_override(&b, &a, prison, in_hours(&h, 1))
            .unwrap();
        assert_eq!(
            h.enforcer
                .clear_override(&a, &a, HardcoreField::Imprisonment)
                .unwrap_err()
                .kind(),
            ErrorKind::PermissionDenied
        );
        h.clock.advance(Duration::from_secs(7200));
        h.enforcer
            .clear_override(&a, &a, HardcoreField::Imprisonment)
            .unwrap();
        assert!(h.enforcer.read_hardcore(&a).unwrap().imprisonment.is_none());
    }

    #[test]
    fn test_invalid_value_rejected_before_grant_check() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        let err = h
            .enforcer
            .set_override(
                &b,
                &a,
                OverrideValue::Imprisonment {
                    territory: 132,
                    position: [0.0, 0.0, 0.0],
                    radius: -1.0,
                },
                None,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
