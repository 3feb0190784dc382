//! Configuration types

use crate::{ConfigError, TetherError, TetherResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What happens when the last owner of a collar is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OwnerRemovalPolicy {
    /// Refuse to remove the last owner
    #[default]
    Restrict,
    /// Delete the collar row together with the last owner edge
    Cascade,
}

impl OwnerRemovalPolicy {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            OwnerRemovalPolicy::Restrict => "Restrict",
            OwnerRemovalPolicy::Cascade => "Cascade",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, ValidationError> {
        match s.to_lowercase().as_str() {
            "restrict" => Ok(OwnerRemovalPolicy::Restrict),
            "cascade" => Ok(OwnerRemovalPolicy::Cascade),
            _ => Err(ValidationError::UnknownName {
                kind: "owner removal policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OwnerRemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for OwnerRemovalPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Upper bound on gag layers a deployment may configure.
pub const MAX_GAG_LAYERS: u8 = 8;
/// Upper bound on restriction layers a deployment may configure.
pub const MAX_RESTRICTION_LAYERS: u8 = 16;

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TetherConfig {
    /// Number of gag layers per identity
    pub gag_layers: u8,
    /// Number of restriction layers per identity
    pub restriction_layers: u8,
    /// Absolute cap on any timed padlock, regardless of grants
    pub max_lock_duration: Duration,
    /// Cap on timed padlocks an identity puts on itself
    pub max_self_lock_duration: Duration,
    pub owner_removal_policy: OwnerRemovalPolicy,
    /// Release padlocks assigned across a pairing when it is removed
    pub release_locks_on_unpair: bool,
    /// Re-reads allowed when a lazy-expiry clear loses a race
    pub conflict_retries: u32,
}

impl Default for TetherConfig {
    fn default() -> Self {
        Self {
            gag_layers: 3,
            restriction_layers: 5,
            max_lock_duration: Duration::from_secs(365 * 24 * 3600),
            max_self_lock_duration: Duration::from_secs(30 * 24 * 3600),
            owner_removal_policy: OwnerRemovalPolicy::Restrict,
            release_locks_on_unpair: true,
            conflict_retries: 3,
        }
    }
}

impl TetherConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TETHER_GAG_LAYERS` (default: 3)
    /// - `TETHER_RESTRICTION_LAYERS` (default: 5)
    /// - `TETHER_MAX_LOCK_DURATION_SECS` (default: one year)
    /// - `TETHER_MAX_SELF_LOCK_DURATION_SECS` (default: 30 days)
    /// - `TETHER_OWNER_REMOVAL_POLICY`: `restrict` or `cascade` (default: restrict)
    /// - `TETHER_RELEASE_LOCKS_ON_UNPAIR` (default: true)
    /// - `TETHER_CONFLICT_RETRIES` (default: 3)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            gag_layers: std::env::var("TETHER_GAG_LAYERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.gag_layers),
            restriction_layers: std::env::var("TETHER_RESTRICTION_LAYERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.restriction_layers),
            max_lock_duration: std::env::var("TETHER_MAX_LOCK_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_lock_duration),
            max_self_lock_duration: std::env::var("TETHER_MAX_SELF_LOCK_DURATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_self_lock_duration),
            owner_removal_policy: std::env::var("TETHER_OWNER_REMOVAL_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.owner_removal_policy),
            release_locks_on_unpair: std::env::var("TETHER_RELEASE_LOCKS_ON_UNPAIR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.release_locks_on_unpair),
            conflict_retries: std::env::var("TETHER_CONFLICT_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.conflict_retries),
        }
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(TetherError::Config) if invalid.
    pub fn validate(&self) -> TetherResult<()> {
        if self.gag_layers == 0 || self.gag_layers > MAX_GAG_LAYERS {
            return Err(invalid(
                "gag_layers",
                self.gag_layers,
                format!("gag_layers must be between 1 and {}", MAX_GAG_LAYERS),
            ));
        }

        if self.restriction_layers == 0 || self.restriction_layers > MAX_RESTRICTION_LAYERS {
            return Err(invalid(
                "restriction_layers",
                self.restriction_layers,
                format!(
                    "restriction_layers must be between 1 and {}",
                    MAX_RESTRICTION_LAYERS
                ),
            ));
        }

        if self.max_lock_duration.is_zero() {
            return Err(invalid(
                "max_lock_duration",
                format!("{:?}", self.max_lock_duration),
                "max_lock_duration must be positive",
            ));
        }

        if self.max_self_lock_duration.is_zero() {
            return Err(invalid(
                "max_self_lock_duration",
                format!("{:?}", self.max_self_lock_duration),
                "max_self_lock_duration must be positive",
            ));
        }

        if self.max_self_lock_duration > self.max_lock_duration {
            return Err(invalid(
                "max_self_lock_duration",
                format!("{:?}", self.max_self_lock_duration),
                "max_self_lock_duration must not exceed max_lock_duration",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: impl Into<String>) -> TetherError {
    TetherError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    })
}
