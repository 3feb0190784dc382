//! Enum types for Tether entities

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity type discriminator, one per persisted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    User,
    PairEdge,
    CapabilityGrant,
    GrantAccess,
    GlobalPermissions,
    GagState,
    RestrictionState,
    RestraintSetState,
    HardcoreState,
    CollarState,
    CollarOwner,
    CollarRequest,
}

impl EntityType {
    /// Table name in the persisted contract.
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityType::User => "users",
            EntityType::PairEdge => "pair_edge",
            EntityType::CapabilityGrant => "capability_grant",
            EntityType::GrantAccess => "grant_access",
            EntityType::GlobalPermissions => "global_permissions",
            EntityType::GagState => "gag_state",
            EntityType::RestrictionState => "restriction_state",
            EntityType::RestraintSetState => "restraint_set_state",
            EntityType::HardcoreState => "hardcore_state",
            EntityType::CollarState => "collar_state",
            EntityType::CollarOwner => "collar_owner",
            EntityType::CollarRequest => "collar_request",
        }
    }
}

// ============================================================================
// ACCOUNT TIER
// ============================================================================

/// Account tier of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    Free,
    Supporter,
    Moderator,
    Admin,
}

impl Tier {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::Supporter => "Supporter",
            Tier::Moderator => "Moderator",
            Tier::Admin => "Admin",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ValidationError> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "supporter" => Ok(Tier::Supporter),
            "moderator" | "mod" => Ok(Tier::Moderator),
            "admin" => Ok(Tier::Admin),
            _ => Err(ValidationError::UnknownName {
                kind: "tier".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for Tier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// MOOD EFFECTS
// ============================================================================

/// Category of a mood effect ("moodle").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoodleKind {
    #[default]
    Positive,
    Negative,
    Special,
}

impl MoodleKind {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MoodleKind::Positive => "Positive",
            MoodleKind::Negative => "Negative",
            MoodleKind::Special => "Special",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, ValidationError> {
        match s.to_lowercase().as_str() {
            "positive" => Ok(MoodleKind::Positive),
            "negative" => Ok(MoodleKind::Negative),
            "special" => Ok(MoodleKind::Special),
            _ => Err(ValidationError::UnknownName {
                kind: "moodle kind".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MoodleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

// ============================================================================
// REMOTE ACTIONS
// ============================================================================

/// Toybox commands a partner may relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToyboxAction {
    ExecutePattern,
    StopPattern,
    ToggleAlarm,
    SendAlarm,
    ToggleTrigger,
    SpatialAudio,
}

/// Operation sent to a shock device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShockOperation {
    Shock,
    Vibrate,
    Beep,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_roundtrip() {
        for tier in [Tier::Free, Tier::Supporter, Tier::Moderator, Tier::Admin] {
            assert_eq!(Tier::from_db_str(tier.as_db_str()).unwrap(), tier);
        }
        assert!("root".parse::<Tier>().is_err());
    }

    #[test]
    fn test_moodle_kind_parse_case_insensitive() {
        assert_eq!(MoodleKind::from_db_str("NEGATIVE").unwrap(), MoodleKind::Negative);
        assert!(MoodleKind::from_db_str("neutral").is_err());
    }

    #[test]
    fn test_table_names_unique() {
        let all = [
            EntityType::User,
            EntityType::PairEdge,
            EntityType::CapabilityGrant,
            EntityType::GrantAccess,
            EntityType::GlobalPermissions,
            EntityType::GagState,
            EntityType::RestrictionState,
            EntityType::RestraintSetState,
            EntityType::HardcoreState,
            EntityType::CollarState,
            EntityType::CollarOwner,
            EntityType::CollarRequest,
        ];
        let mut names: Vec<_> = all.iter().map(|e| e.table_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all.len());
    }
}
