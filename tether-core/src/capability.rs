//! The fixed capability catalog.
//!
//! Every pair-scoped permission is one [`Capability`]. The catalog is closed
//! and versioned: adding an entry bumps [`CATALOG_VERSION`] and appends to the
//! end so [`CapabilitySet`] bit positions stay stable.

use crate::{MoodlePerms, PuppetPerms, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Catalog revision. Stored alongside grant rows by persistent backends.
pub const CATALOG_VERSION: u32 = 3;

/// Capability domains, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityDomain {
    Gag,
    Restriction,
    RestraintSet,
    Puppeteer,
    Moodle,
    Toybox,
    Hardcore,
    Shock,
    Trust,
}

/// Shape of the value a capability carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantKind {
    Flag,
    Duration,
    Puppet,
    Moodle,
    Intensity,
    Text,
}

impl fmt::Display for GrantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GrantKind::Flag => "flag",
            GrantKind::Duration => "duration",
            GrantKind::Puppet => "puppet perms",
            GrantKind::Moodle => "moodle perms",
            GrantKind::Intensity => "intensity",
            GrantKind::Text => "text",
        };
        f.write_str(name)
    }
}

// ============================================================================
// CAPABILITY
// ============================================================================

/// One entry of the capability catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Capability {
    // gag
    ApplyGags,
    LockGags,
    MaxGagTime,
    UnlockGags,
    RemoveGags,
    // restriction
    ApplyRestrictions,
    LockRestrictions,
    MaxRestrictionTime,
    UnlockRestrictions,
    RemoveRestrictions,
    // restraint set
    ApplyRestraintSets,
    ApplyRestraintLayers,
    ApplyLayersWhileLocked,
    LockRestraintSets,
    MaxRestraintTime,
    UnlockRestraintSets,
    RemoveRestraintSets,
    // puppeteer
    PuppetPerms,
    // moodles
    MoodlePerms,
    MaxMoodleTime,
    // toybox
    ExecutePatterns,
    StopPatterns,
    ToggleAlarms,
    SendAlarms,
    ToggleTriggers,
    SpatialAudio,
    // hardcore
    AllowLockedFollowing,
    AllowLockedSitting,
    AllowLockedEmoting,
    AllowIndoorConfinement,
    AllowImprisonment,
    AllowHidingChatBoxes,
    AllowHidingChatInput,
    AllowChatInputBlocking,
    AllowHypnosisSending,
    MaxHypnosisTime,
    // shock device
    AllowShocks,
    AllowVibrations,
    AllowBeeps,
    MaxShockIntensity,
    MaxShockDuration,
    ShockShareCode,
    // trust
    DevotionalLocks,
    OwnerLocks,
    PermanentLocks,
    GarblerChannelsEditing,
}

impl Capability {
    /// Every catalog entry, in bit order.
    pub const ALL: [Capability; 46] = [
        Capability::ApplyGags,
        Capability::LockGags,
        Capability::MaxGagTime,
        Capability::UnlockGags,
        Capability::RemoveGags,
        Capability::ApplyRestrictions,
        Capability::LockRestrictions,
        Capability::MaxRestrictionTime,
        Capability::UnlockRestrictions,
        Capability::RemoveRestrictions,
        Capability::ApplyRestraintSets,
        Capability::ApplyRestraintLayers,
        Capability::ApplyLayersWhileLocked,
        Capability::LockRestraintSets,
        Capability::MaxRestraintTime,
        Capability::UnlockRestraintSets,
        Capability::RemoveRestraintSets,
        Capability::PuppetPerms,
        Capability::MoodlePerms,
        Capability::MaxMoodleTime,
        Capability::ExecutePatterns,
        Capability::StopPatterns,
        Capability::ToggleAlarms,
        Capability::SendAlarms,
        Capability::ToggleTriggers,
        Capability::SpatialAudio,
        Capability::AllowLockedFollowing,
        Capability::AllowLockedSitting,
        Capability::AllowLockedEmoting,
        Capability::AllowIndoorConfinement,
        Capability::AllowImprisonment,
        Capability::AllowHidingChatBoxes,
        Capability::AllowHidingChatInput,
        Capability::AllowChatInputBlocking,
        Capability::AllowHypnosisSending,
        Capability::MaxHypnosisTime,
        Capability::AllowShocks,
        Capability::AllowVibrations,
        Capability::AllowBeeps,
        Capability::MaxShockIntensity,
        Capability::MaxShockDuration,
        Capability::ShockShareCode,
        Capability::DevotionalLocks,
        Capability::OwnerLocks,
        Capability::PermanentLocks,
        Capability::GarblerChannelsEditing,
    ];

    /// Stable bit position within a [`CapabilitySet`].
    pub fn bit(&self) -> u32 {
        *self as u8 as u32
    }

    /// Convert to database column name.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Capability::ApplyGags => "apply_gags",
            Capability::LockGags => "lock_gags",
            Capability::MaxGagTime => "max_gag_time",
            Capability::UnlockGags => "unlock_gags",
            Capability::RemoveGags => "remove_gags",
            Capability::ApplyRestrictions => "apply_restrictions",
            Capability::LockRestrictions => "lock_restrictions",
            Capability::MaxRestrictionTime => "max_restriction_time",
            Capability::UnlockRestrictions => "unlock_restrictions",
            Capability::RemoveRestrictions => "remove_restrictions",
            Capability::ApplyRestraintSets => "apply_restraint_sets",
            Capability::ApplyRestraintLayers => "apply_restraint_layers",
            Capability::ApplyLayersWhileLocked => "apply_layers_while_locked",
            Capability::LockRestraintSets => "lock_restraint_sets",
            Capability::MaxRestraintTime => "max_restraint_time",
            Capability::UnlockRestraintSets => "unlock_restraint_sets",
            Capability::RemoveRestraintSets => "remove_restraint_sets",
            Capability::PuppetPerms => "puppet_perms",
            Capability::MoodlePerms => "moodle_perms",
            Capability::MaxMoodleTime => "max_moodle_time",
            Capability::ExecutePatterns => "execute_patterns",
            Capability::StopPatterns => "stop_patterns",
            Capability::ToggleAlarms => "toggle_alarms",
            Capability::SendAlarms => "send_alarms",
            Capability::ToggleTriggers => "toggle_triggers",
            Capability::SpatialAudio => "spatial_audio",
            Capability::AllowLockedFollowing => "allow_locked_following",
            Capability::AllowLockedSitting => "allow_locked_sitting",
            Capability::AllowLockedEmoting => "allow_locked_emoting",
            Capability::AllowIndoorConfinement => "allow_indoor_confinement",
            Capability::AllowImprisonment => "allow_imprisonment",
            Capability::AllowHidingChatBoxes => "allow_hiding_chat_boxes",
            Capability::AllowHidingChatInput => "allow_hiding_chat_input",
            Capability::AllowChatInputBlocking => "allow_chat_input_blocking",
            Capability::AllowHypnosisSending => "allow_hypnosis_sending",
            Capability::MaxHypnosisTime => "max_hypnosis_time",
            Capability::AllowShocks => "allow_shocks",
            Capability::AllowVibrations => "allow_vibrations",
            Capability::AllowBeeps => "allow_beeps",
            Capability::MaxShockIntensity => "max_shock_intensity",
            Capability::MaxShockDuration => "max_shock_duration",
            Capability::ShockShareCode => "shock_share_code",
            Capability::DevotionalLocks => "devotional_locks",
            Capability::OwnerLocks => "owner_locks",
            Capability::PermanentLocks => "permanent_locks",
            Capability::GarblerChannelsEditing => "garbler_channels_editing",
        }
    }

    /// Parse from database column name.
    pub fn from_db_str(s: &str) -> Result<Self, ValidationError> {
        let needle = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_db_str() == needle)
            .ok_or_else(|| ValidationError::UnknownName {
                kind: "capability".to_string(),
                value: s.to_string(),
            })
    }

    pub fn domain(&self) -> CapabilityDomain {
        use Capability::*;
        match self {
            ApplyGags | LockGags | MaxGagTime | UnlockGags | RemoveGags => CapabilityDomain::Gag,
            ApplyRestrictions | LockRestrictions | MaxRestrictionTime | UnlockRestrictions
            | RemoveRestrictions => CapabilityDomain::Restriction,
            ApplyRestraintSets | ApplyRestraintLayers | ApplyLayersWhileLocked
            | LockRestraintSets | MaxRestraintTime | UnlockRestraintSets | RemoveRestraintSets => {
                CapabilityDomain::RestraintSet
            }
            Capability::PuppetPerms => CapabilityDomain::Puppeteer,
            Capability::MoodlePerms | MaxMoodleTime => CapabilityDomain::Moodle,
            ExecutePatterns | StopPatterns | ToggleAlarms | SendAlarms | ToggleTriggers
            | SpatialAudio => CapabilityDomain::Toybox,
            AllowLockedFollowing | AllowLockedSitting | AllowLockedEmoting
            | AllowIndoorConfinement | AllowImprisonment | AllowHidingChatBoxes
            | AllowHidingChatInput | AllowChatInputBlocking | AllowHypnosisSending
            | MaxHypnosisTime => CapabilityDomain::Hardcore,
            AllowShocks | AllowVibrations | AllowBeeps | MaxShockIntensity | MaxShockDuration
            | ShockShareCode => CapabilityDomain::Shock,
            DevotionalLocks | OwnerLocks | PermanentLocks | GarblerChannelsEditing => {
                CapabilityDomain::Trust
            }
        }
    }

    pub fn kind(&self) -> GrantKind {
        use Capability::*;
        match self {
            MaxGagTime | MaxRestrictionTime | MaxRestraintTime | MaxMoodleTime
            | MaxHypnosisTime | MaxShockDuration => GrantKind::Duration,
            Capability::PuppetPerms => GrantKind::Puppet,
            Capability::MoodlePerms => GrantKind::Moodle,
            MaxShockIntensity => GrantKind::Intensity,
            ShockShareCode => GrantKind::Text,
            _ => GrantKind::Flag,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for Capability {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// GRANT VALUE
// ============================================================================

/// Value of one capability in a grant row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantValue {
    Flag(bool),
    Duration(Duration),
    Puppet(PuppetPerms),
    Moodle(MoodlePerms),
    /// Percentage, 0..=100
    Intensity(u8),
    Text(String),
}

impl GrantValue {
    pub fn kind(&self) -> GrantKind {
        match self {
            GrantValue::Flag(_) => GrantKind::Flag,
            GrantValue::Duration(_) => GrantKind::Duration,
            GrantValue::Puppet(_) => GrantKind::Puppet,
            GrantValue::Moodle(_) => GrantKind::Moodle,
            GrantValue::Intensity(_) => GrantKind::Intensity,
            GrantValue::Text(_) => GrantKind::Text,
        }
    }

    /// Truthiness used by boolean checks: set flags, non-zero bounds, non-empty sets.
    pub fn is_granted(&self) -> bool {
        match self {
            GrantValue::Flag(b) => *b,
            GrantValue::Duration(d) => !d.is_zero(),
            GrantValue::Puppet(p) => !p.is_empty(),
            GrantValue::Moodle(m) => !m.is_empty(),
            GrantValue::Intensity(i) => *i > 0,
            GrantValue::Text(t) => !t.is_empty(),
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            GrantValue::Duration(d) => Some(*d),
            _ => None,
        }
    }
}

// ============================================================================
// CAPABILITY SET
// ============================================================================

/// One bit per catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u64);

impl CapabilitySet {
    const VALID_MASK: u64 = (1u64 << Capability::ALL.len()) - 1;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self(Self::VALID_MASK)
    }

    pub fn from_bits(bits: u64) -> Option<Self> {
        if bits & !Self::VALID_MASK == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & (1u64 << capability.bit()) != 0
    }

    pub fn set(&mut self, capability: Capability, value: bool) {
        if value {
            self.0 |= 1u64 << capability.bit();
        } else {
            self.0 &= !(1u64 << capability.bit());
        }
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.set(capability, true);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.iter().copied().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::empty(), |set, c| set.with(c))
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u64::deserialize(deserializer)?;
        Self::from_bits(bits).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid CapabilitySet bits: {:#x}", bits))
        })
    }
}
