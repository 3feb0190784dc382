//! Per-edge capability grants and their mutability mask.

use crate::{
    Capability, CapabilitySet, GrantKind, GrantValue, MoodlePerms, PuppetPerms, Uid,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for intensity-valued grants (percent).
pub const MAX_INTENSITY: u8 = 100;

// ============================================================================
// DOMAIN GROUPS
// ============================================================================

/// Grants over a multi-layer surface (gags, restrictions).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceGrants {
    pub apply: bool,
    pub lock: bool,
    pub max_time: Duration,
    pub unlock: bool,
    pub remove: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestraintGrants {
    pub apply: bool,
    pub apply_layers: bool,
    pub apply_layers_while_locked: bool,
    pub lock: bool,
    pub max_time: Duration,
    pub unlock: bool,
    pub remove: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodleGrants {
    pub perms: MoodlePerms,
    pub max_time: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToyboxGrants {
    pub execute_patterns: bool,
    pub stop_patterns: bool,
    pub toggle_alarms: bool,
    pub send_alarms: bool,
    pub toggle_triggers: bool,
    pub spatial_audio: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardcoreGrants {
    pub locked_following: bool,
    pub locked_sitting: bool,
    pub locked_emoting: bool,
    pub indoor_confinement: bool,
    pub imprisonment: bool,
    pub hiding_chat_boxes: bool,
    pub hiding_chat_input: bool,
    pub chat_input_blocking: bool,
    pub hypnosis_sending: bool,
    pub max_hypnosis_time: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShockGrants {
    pub shocks: bool,
    pub vibrations: bool,
    pub beeps: bool,
    pub max_intensity: u8,
    pub max_duration: Duration,
    pub share_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustGrants {
    pub devotional_locks: bool,
    pub owner_locks: bool,
    pub permanent_locks: bool,
    pub garbler_channels_editing: bool,
}

// ============================================================================
// CAPABILITY GRANT ROW
// ============================================================================

/// What `owner` currently permits `partner` to do. Keyed by `(owner, partner)`.
///
/// Rows are created fully populated with every capability off; there is no
/// sparse representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub owner: Uid,
    pub partner: Uid,
    pub gag: SurfaceGrants,
    pub restriction: SurfaceGrants,
    pub restraint: RestraintGrants,
    pub puppet_perms: PuppetPerms,
    pub moodle: MoodleGrants,
    pub toybox: ToyboxGrants,
    pub hardcore: HardcoreGrants,
    pub shock: ShockGrants,
    pub trust: TrustGrants,
}

// Maps every catalog entry onto its field. The match arms must stay exhaustive.
macro_rules! grant_fields {
    ($( $cap:ident => $variant:ident ( $($field:ident).+ ) ),* $(,)?) => {
        impl CapabilityGrant {
            /// Read one capability value.
            pub fn get(&self, capability: Capability) -> GrantValue {
                match capability {
                    $( Capability::$cap => GrantValue::$variant(self.$($field).+.clone()), )*
                }
            }

            /// Write one capability value, rejecting values of the wrong kind.
            pub fn set(
                &mut self,
                capability: Capability,
                value: GrantValue,
            ) -> Result<(), ValidationError> {
                check_value(capability, &value)?;
                match (capability, value) {
                    $( (Capability::$cap, GrantValue::$variant(v)) => self.$($field).+ = v, )*
                    (capability, value) => return Err(kind_mismatch(capability, value.kind())),
                }
                Ok(())
            }
        }
    };
}

grant_fields! {
    ApplyGags => Flag(gag.apply),
    LockGags => Flag(gag.lock),
    MaxGagTime => Duration(gag.max_time),
    UnlockGags => Flag(gag.unlock),
    RemoveGags => Flag(gag.remove),
    ApplyRestrictions => Flag(restriction.apply),
    LockRestrictions => Flag(restriction.lock),
    MaxRestrictionTime => Duration(restriction.max_time),
    UnlockRestrictions => Flag(restriction.unlock),
    RemoveRestrictions => Flag(restriction.remove),
    ApplyRestraintSets => Flag(restraint.apply),
    ApplyRestraintLayers => Flag(restraint.apply_layers),
    ApplyLayersWhileLocked => Flag(restraint.apply_layers_while_locked),
    LockRestraintSets => Flag(restraint.lock),
    MaxRestraintTime => Duration(restraint.max_time),
    UnlockRestraintSets => Flag(restraint.unlock),
    RemoveRestraintSets => Flag(restraint.remove),
    PuppetPerms => Puppet(puppet_perms),
    MoodlePerms => Moodle(moodle.perms),
    MaxMoodleTime => Duration(moodle.max_time),
    ExecutePatterns => Flag(toybox.execute_patterns),
    StopPatterns => Flag(toybox.stop_patterns),
    ToggleAlarms => Flag(toybox.toggle_alarms),
    SendAlarms => Flag(toybox.send_alarms),
    ToggleTriggers => Flag(toybox.toggle_triggers),
    SpatialAudio => Flag(toybox.spatial_audio),
    AllowLockedFollowing => Flag(hardcore.locked_following),
    AllowLockedSitting => Flag(hardcore.locked_sitting),
    AllowLockedEmoting => Flag(hardcore.locked_emoting),
    AllowIndoorConfinement => Flag(hardcore.indoor_confinement),
    AllowImprisonment => Flag(hardcore.imprisonment),
    AllowHidingChatBoxes => Flag(hardcore.hiding_chat_boxes),
    AllowHidingChatInput => Flag(hardcore.hiding_chat_input),
    AllowChatInputBlocking => Flag(hardcore.chat_input_blocking),
    AllowHypnosisSending => Flag(hardcore.hypnosis_sending),
    MaxHypnosisTime => Duration(hardcore.max_hypnosis_time),
    AllowShocks => Flag(shock.shocks),
    AllowVibrations => Flag(shock.vibrations),
    AllowBeeps => Flag(shock.beeps),
    MaxShockIntensity => Intensity(shock.max_intensity),
    MaxShockDuration => Duration(shock.max_duration),
    ShockShareCode => Text(shock.share_code),
    DevotionalLocks => Flag(trust.devotional_locks),
    OwnerLocks => Flag(trust.owner_locks),
    PermanentLocks => Flag(trust.permanent_locks),
    GarblerChannelsEditing => Flag(trust.garbler_channels_editing),
}

fn kind_mismatch(capability: Capability, got: GrantKind) -> ValidationError {
    ValidationError::GrantKindMismatch {
        capability: capability.to_string(),
        expected: capability.kind().to_string(),
        got: got.to_string(),
    }
}

fn check_value(capability: Capability, value: &GrantValue) -> Result<(), ValidationError> {
    if capability.kind() != value.kind() {
        return Err(kind_mismatch(capability, value.kind()));
    }
    if let GrantValue::Intensity(i) = value {
        if *i > MAX_INTENSITY {
            return Err(ValidationError::InvalidValue {
                field: capability.to_string(),
                reason: format!("intensity {} exceeds {}", i, MAX_INTENSITY),
            });
        }
    }
    Ok(())
}

impl CapabilityGrant {
    /// A fresh row with every capability off.
    pub fn new(owner: Uid, partner: Uid) -> Self {
        Self {
            owner,
            partner,
            gag: SurfaceGrants::default(),
            restriction: SurfaceGrants::default(),
            restraint: RestraintGrants::default(),
            puppet_perms: PuppetPerms::empty(),
            moodle: MoodleGrants::default(),
            toybox: ToyboxGrants::default(),
            hardcore: HardcoreGrants::default(),
            shock: ShockGrants::default(),
            trust: TrustGrants::default(),
        }
    }

    /// Boolean view of a capability (see [`GrantValue::is_granted`]).
    pub fn allows(&self, capability: Capability) -> bool {
        self.get(capability).is_granted()
    }
}

// ============================================================================
// GRANT ACCESS ROW
// ============================================================================

/// Which fields of `CapabilityGrant[owner, partner]` the partner may edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantAccess {
    pub owner: Uid,
    pub partner: Uid,
    pub editable: CapabilitySet,
}

impl GrantAccess {
    pub fn new(owner: Uid, partner: Uid) -> Self {
        Self {
            owner,
            partner,
            editable: CapabilitySet::empty(),
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.editable.contains(capability)
    }
}
