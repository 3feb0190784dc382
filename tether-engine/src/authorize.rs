//! Remote action checks.
//!
//! Nothing here writes. Transport code calls these before relaying a
//! puppeteer, mood, toybox or shock command on `owner`'s behalf.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_core::{
    Capability, EntityType, MoodlePerms, PuppetPerms, ShockOperation, TetherError, TetherResult,
    ToyboxAction, Uid, MAX_INTENSITY,
};
use tether_storage::StoreTrait;

use crate::{deny, Authority, Enforcer};

const RESOURCE: EntityType = EntityType::CapabilityGrant;

/// One command for a shock device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShockInstruction {
    pub operation: ShockOperation,
    /// Percent, 0..=100. Ignored for beeps.
    pub intensity: u8,
    pub duration: Duration,
}

/// Effective ceilings for one actor on one wearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShockBounds {
    pub max_intensity: u8,
    pub max_duration: Duration,
}

fn toybox_capability(action: ToyboxAction) -> Capability {
    match action {
        ToyboxAction::ExecutePattern => Capability::ExecutePatterns,
        ToyboxAction::StopPattern => Capability::StopPatterns,
        ToyboxAction::ToggleAlarm => Capability::ToggleAlarms,
        ToyboxAction::SendAlarm => Capability::SendAlarms,
        ToyboxAction::ToggleTrigger => Capability::ToggleTriggers,
        ToyboxAction::SpatialAudio => Capability::SpatialAudio,
    }
}

fn shock_capability(operation: ShockOperation) -> Capability {
    match operation {
        ShockOperation::Shock => Capability::AllowShocks,
        ShockOperation::Vibrate => Capability::AllowVibrations,
        ShockOperation::Beep => Capability::AllowBeeps,
    }
}

impl<S: StoreTrait> Enforcer<S> {
    pub fn authorize_puppet(
        &self,
        actor: &Uid,
        owner: &Uid,
        needed: PuppetPerms,
    ) -> TetherResult<()> {
        match self.authority(actor, owner, RESOURCE)? {
            Authority::Own => Ok(()),
            Authority::Partner(grant) if grant.puppet_perms.permits(needed) => Ok(()),
            Authority::Partner(_) => Err(deny(actor, Capability::PuppetPerms.as_db_str(), RESOURCE)),
        }
    }

    /// Check a mood effect. `duration: None` asks for a permanent effect.
    /// Removal alone carries no duration bound.
    pub fn authorize_moodle(
        &self,
        actor: &Uid,
        owner: &Uid,
        needed: MoodlePerms,
        duration: Option<Duration>,
    ) -> TetherResult<()> {
        let grant = match self.authority(actor, owner, RESOURCE)? {
            Authority::Own => return Ok(()),
            Authority::Partner(grant) => grant,
        };
        if !grant.moodle.perms.contains(needed) {
            return Err(deny(actor, Capability::MoodlePerms.as_db_str(), RESOURCE));
        }
        if needed.difference(MoodlePerms::REMOVE).is_empty() {
            return Ok(());
        }
        match duration {
            None if grant.moodle.perms.contains(MoodlePerms::PERMANENT) => Ok(()),
            None => Err(deny(actor, "permanent moodle", RESOURCE)),
            Some(d) if d <= grant.moodle.max_time => Ok(()),
            Some(_) => Err(deny(actor, Capability::MaxMoodleTime.as_db_str(), RESOURCE)),
        }
    }

    pub fn authorize_toybox(
        &self,
        actor: &Uid,
        owner: &Uid,
        action: ToyboxAction,
    ) -> TetherResult<()> {
        self.authority(actor, owner, RESOURCE)?
            .require(actor, toybox_capability(action), RESOURCE)
    }

    /// Ceilings `actor` works under on `owner`'s device: the tighter of the
    /// pair grant and the wearer's own globals.
    pub fn shock_bounds(&self, actor: &Uid, owner: &Uid) -> TetherResult<ShockBounds> {
        let authority = self.authority(actor, owner, RESOURCE)?;
        let globals = self.read_globals(owner)?;
        let own = ShockBounds {
            max_intensity: globals.max_shock_intensity,
            max_duration: globals.max_shock_duration,
        };
        Ok(match authority.grant() {
            None => own,
            Some(grant) => ShockBounds {
                max_intensity: own.max_intensity.min(grant.shock.max_intensity),
                max_duration: own.max_duration.min(grant.shock.max_duration),
            },
        })
    }

    pub fn authorize_shock(
        &self,
        actor: &Uid,
        owner: &Uid,
        instruction: ShockInstruction,
    ) -> TetherResult<()> {
        if instruction.intensity > MAX_INTENSITY {
            return Err(TetherError::invalid_value(
                "intensity",
                format!("{} exceeds {}", instruction.intensity, MAX_INTENSITY),
            ));
        }
        let authority = self.authority(actor, owner, RESOURCE)?;
        if authority.is_own() {
            return Ok(());
        }
        authority.require(actor, shock_capability(instruction.operation), RESOURCE)?;

        let bounds = self.shock_bounds(actor, owner)?;
        if instruction.operation != ShockOperation::Beep
            && instruction.intensity > bounds.max_intensity
        {
            return Err(deny(actor, Capability::MaxShockIntensity.as_db_str(), RESOURCE));
        }
        if instruction.duration > bounds.max_duration {
            return Err(deny(actor, Capability::MaxShockDuration.as_db_str(), RESOURCE));
        }
        tracing::debug!(
            %actor,
            %owner,
            operation = ?instruction.operation,
            intensity = instruction.intensity,
            "Shock authorized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use tether_core::{ErrorKind, GlobalChange, GrantValue};

    fn shock(operation: ShockOperation, intensity: u8, secs: u64) -> ShockInstruction {
        ShockInstruction {
            operation,
            intensity,
            duration: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_self_always_authorized() {
        let h = harness();
        let a = h.user("AB12345678");
        h.enforcer.authorize_puppet(&a, &a, PuppetPerms::ALL).unwrap();
        h.enforcer
            .authorize_moodle(&a, &a, MoodlePerms::NEGATIVE, None)
            .unwrap();
        h.enforcer
            .authorize_toybox(&a, &a, ToyboxAction::SendAlarm)
            .unwrap();
        h.enforcer
            .authorize_shock(&a, &a, shock(ShockOperation::Shock, 100, 60))
            .unwrap();
    }

    #[test]
    fn test_puppet_all_covers_narrow_requests() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        assert_eq!(
            h.enforcer
                .authorize_puppet(&b, &a, PuppetPerms::SIT)
                .unwrap_err()
                .kind(),
            ErrorKind::PermissionDenied
        );
        h.grant_value(&a, &b, Capability::PuppetPerms, GrantValue::Puppet(PuppetPerms::ALL));
        h.enforcer
            .authorize_puppet(&b, &a, PuppetPerms::SIT | PuppetPerms::EMOTES)
            .unwrap();
    }

    #[test]
    fn test_moodle_duration_rules() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_value(
            &a,
            &b,
            Capability::MoodlePerms,
            GrantValue::Moodle(MoodlePerms::POSITIVE | MoodlePerms::APPLY_OWN | MoodlePerms::REMOVE),
        );
        h.grant_value(
            &a,
            &b,
            Capability::MaxMoodleTime,
            GrantValue::Duration(Duration::from_secs(1800)),
        );
        let apply = MoodlePerms::POSITIVE | MoodlePerms::APPLY_OWN;

        h.enforcer
            .authorize_moodle(&b, &a, apply, Some(Duration::from_secs(1800)))
            .unwrap();
        assert_eq!(
            h.enforcer
                .authorize_moodle(&b, &a, apply, Some(Duration::from_secs(1801)))
                .unwrap_err()
                .kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            h.enforcer
                .authorize_moodle(&b, &a, apply, None)
                .unwrap_err()
                .kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            h.enforcer
                .authorize_moodle(&b, &a, MoodlePerms::NEGATIVE, Some(Duration::from_secs(1)))
                .unwrap_err()
                .kind(),
            ErrorKind::PermissionDenied
        );
        h.enforcer
            .authorize_moodle(&b, &a, MoodlePerms::REMOVE, None)
            .unwrap();
    }

    #[test]
    fn test_toybox_maps_actions() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_flags(&a, &b, &[Capability::StopPatterns]);
        h.enforcer
            .authorize_toybox(&b, &a, ToyboxAction::StopPattern)
            .unwrap();
        assert_eq!(
            h.enforcer
                .authorize_toybox(&b, &a, ToyboxAction::ExecutePattern)
                .unwrap_err()
                .kind(),
            ErrorKind::PermissionDenied
        );
    }

    #[test]
    fn test_shock_bounds_take_the_minimum() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_value(&a, &b, Capability::MaxShockIntensity, GrantValue::Intensity(80));
        h.grant_value(
            &a,
            &b,
            Capability::MaxShockDuration,
            GrantValue::Duration(Duration::from_secs(30)),
        );
        h.enforcer
            .update_globals(&a, &a, GlobalChange::MaxShockIntensity(50))
            .unwrap();

        let bounds = h.enforcer.shock_bounds(&b, &a).unwrap();
        assert_eq!(bounds.max_intensity, 50);
        assert_eq!(bounds.max_duration, Duration::from_secs(15));
    }

    #[test]
    fn test_shock_checks() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_flags(&a, &b, &[Capability::AllowShocks, Capability::AllowBeeps]);
        h.grant_value(&a, &b, Capability::MaxShockIntensity, GrantValue::Intensity(40));
        h.grant_value(
            &a,
            &b,
            Capability::MaxShockDuration,
            GrantValue::Duration(Duration::from_secs(5)),
        );

        h.enforcer
            .authorize_shock(&b, &a, shock(ShockOperation::Shock, 40, 5))
            .unwrap();
        let too_strong = h
            .enforcer
            .authorize_shock(&b, &a, shock(ShockOperation::Shock, 41, 5))
            .unwrap_err();
        assert_eq!(too_strong.kind(), ErrorKind::PermissionDenied);
        let too_long = h
            .enforcer
            .authorize_shock(&b, &a, shock(ShockOperation::Shock, 10, 6))
            .unwrap_err();
        assert_eq!(too_long.kind(), ErrorKind::PermissionDenied);

        // Beeps ignore intensity.
        h.enforcer
            .authorize_shock(&b, &a, shock(ShockOperation::Beep, 100, 1))
            .unwrap();
        assert_eq!(
            h.enforcer
                .authorize_shock(&b, &a, shock(ShockOperation::Vibrate, 1, 1))
                .unwrap_err()
                .kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            h.enforcer
                .authorize_shock(&b, &a, shock(ShockOperation::Beep, 101, 1))
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_unpaired_actor_denied() {
        let h = harness();
        let a = h.user("AB12345678");
        let c = h.user("CC00000000");
        assert_eq!(
            h.enforcer
                .authorize_toybox(&c, &a, ToyboxAction::ToggleAlarm)
                .unwrap_err()
                .kind(),
            ErrorKind::PermissionDenied
        );
    }
}
