//! Padlock typestate for the lockable restraint surfaces.
//!
//! Gags, restrictions, restraint sets and collars share one persisted
//! [`LockSlot`]. Transitions go through [`Padlocked`], whose type parameter
//! makes it impossible to engage an engaged lock or release an open one.
//!
//! # State Transition Diagram
//!
//! ```text
//! Open ─── engage() ──→ Engaged ─── release() ──→ Open
//!                          │
//!                   (timer passes) → observed as Lapsed
//! ```

use crate::{AccessError, EntityType, TetherError, Timestamp, Uid, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// PADLOCK KIND
// ============================================================================

/// Kind of padlock on a layer. Each kind carries distinct unlock rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Padlock {
    #[default]
    None,
    Simple,
    Password,
    Timed,
    TimedPassword,
    /// Only the assigner or a partner trusted with owner locks may open it
    OwnerOnly,
    OwnerTimed,
    /// Only the assigner may open it
    Devotional,
    DevotionalTimed,
    Permanent,
}

impl Padlock {
    pub const ALL: [Padlock; 10] = [
        Padlock::None,
        Padlock::Simple,
        Padlock::Password,
        Padlock::Timed,
        Padlock::TimedPassword,
        Padlock::OwnerOnly,
        Padlock::OwnerTimed,
        Padlock::Devotional,
        Padlock::DevotionalTimed,
        Padlock::Permanent,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Padlock::None => "None",
            Padlock::Simple => "Simple",
            Padlock::Password => "Password",
            Padlock::Timed => "Timed",
            Padlock::TimedPassword => "TimedPassword",
            Padlock::OwnerOnly => "OwnerOnly",
            Padlock::OwnerTimed => "OwnerTimed",
            Padlock::Devotional => "Devotional",
            Padlock::DevotionalTimed => "DevotionalTimed",
            Padlock::Permanent => "Permanent",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ValidationError> {
        let needle = s.to_lowercase().replace(['_', '-'], "");
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_db_str().to_lowercase() == needle)
            .ok_or_else(|| ValidationError::UnknownName {
                kind: "padlock".to_string(),
                value: s.to_string(),
            })
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Padlock::None)
    }

    pub fn is_password_class(&self) -> bool {
        matches!(self, Padlock::Password | Padlock::TimedPassword)
    }

    pub fn is_timed_class(&self) -> bool {
        matches!(
            self,
            Padlock::Timed | Padlock::TimedPassword | Padlock::OwnerTimed | Padlock::DevotionalTimed
        )
    }

    pub fn is_owner_class(&self) -> bool {
        matches!(self, Padlock::OwnerOnly | Padlock::OwnerTimed)
    }

    pub fn is_devotional_class(&self) -> bool {
        matches!(self, Padlock::Devotional | Padlock::DevotionalTimed)
    }
}

impl fmt::Display for Padlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for Padlock {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// LOCK SLOT (persisted, state-independent)
// ============================================================================

/// Padlock columns shared by every lockable row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSlot {
    pub padlock: Padlock,
    pub password: Option<String>,
    pub timer: Option<Timestamp>,
    pub assigner: Option<Uid>,
}

impl LockSlot {
    pub fn is_locked(&self) -> bool {
        !self.padlock.is_none()
    }

    /// A timed-class lock whose timer has passed.
    pub fn is_lapsed(&self, now: Timestamp) -> bool {
        self.padlock.is_timed_class() && self.timer.is_some_and(|t| now >= t)
    }

    /// Remaining time on a timed-class lock.
    pub fn remaining(&self, now: Timestamp) -> Option<Duration> {
        match self.timer {
            Some(t) if self.padlock.is_timed_class() && t > now => (t - now).to_std().ok(),
            _ => None,
        }
    }

    /// Check the structural invariant relating padlock kind to the other columns.
    pub fn check(&self) -> Result<(), PadlockError> {
        let violation = |reason: &str| {
            Err(PadlockError::Invariant {
                padlock: self.padlock,
                reason: reason.to_string(),
            })
        };
        if self.padlock.is_none() {
            if self.password.is_some() || self.timer.is_some() || self.assigner.is_some() {
                return violation("unlocked slot carries lock fields");
            }
            return Ok(());
        }
        if self.assigner.is_none() {
            return violation("assigner missing");
        }
        match (self.padlock.is_timed_class(), self.timer.is_some()) {
            (true, false) => return violation("timer missing"),
            (false, true) => return violation("timer on untimed padlock"),
            _ => {}
        }
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        match (self.padlock.is_password_class(), has_password) {
            (true, false) => return violation("password missing"),
            (false, _) if self.password.is_some() => {
                return violation("password on non-password padlock")
            }
            _ => {}
        }
        Ok(())
    }

    /// Classify the stored slot against `now`.
    pub fn observe(self, now: Timestamp) -> Observed {
        if self.padlock.is_none() {
            Observed::Open(Padlocked::wrap(self))
        } else if self.is_lapsed(now) {
            Observed::Lapsed(Padlocked::wrap(self))
        } else {
            Observed::Engaged(Padlocked::wrap(self))
        }
    }
}

// ============================================================================
// TYPESTATE MARKERS
// ============================================================================

/// Marker trait for padlock states.
pub trait PadlockState: private::Sealed + Send + Sync {}

/// No padlock on the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Open;
impl PadlockState for Open {}

/// A padlock is on the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engaged;
impl PadlockState for Engaged {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Open {}
    impl Sealed for super::Engaged {}
}

/// A lock request as it arrives from an actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub padlock: Padlock,
    pub password: Option<String>,
    pub duration: Option<Duration>,
}

impl LockRequest {
    pub fn simple() -> Self {
        Self::of(Padlock::Simple)
    }

    pub fn of(padlock: Padlock) -> Self {
        Self {
            padlock,
            password: None,
            duration: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

// ============================================================================
// PADLOCKED WRAPPER
// ============================================================================

/// A lock slot with compile-time state tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Padlocked<S: PadlockState> {
    slot: LockSlot,
    _state: PhantomData<S>,
}

impl<S: PadlockState> Padlocked<S> {
    fn wrap(slot: LockSlot) -> Self {
        Padlocked {
            slot,
            _state: PhantomData,
        }
    }

    pub fn slot(&self) -> &LockSlot {
        &self.slot
    }

    /// Consume and return the persisted columns.
    pub fn into_slot(self) -> LockSlot {
        self.slot
    }
}

impl Padlocked<Open> {
    pub fn new() -> Self {
        Self::wrap(LockSlot::default())
    }

    /// Engage a padlock, validating the request's shape.
    ///
    /// Grant-derived limits (max durations, trust flags) are the caller's
    /// concern; this only enforces what the padlock kind itself requires.
    pub fn engage(
        self,
        request: LockRequest,
        assigner: Uid,
        now: Timestamp,
    ) -> Result<Padlocked<Engaged>, PadlockError> {
        let padlock = request.padlock;
        if padlock.is_none() {
            return Err(PadlockError::NoPadlock);
        }

        let timer = match (padlock.is_timed_class(), request.duration) {
            (true, None) => return Err(PadlockError::MissingDuration { padlock }),
            (true, Some(d)) if d.is_zero() => return Err(PadlockError::ZeroDuration),
            (true, Some(d)) => {
                let delta =
                    chrono::Duration::from_std(d).map_err(|_| PadlockError::DurationOutOfRange)?;
                Some(
                    now.checked_add_signed(delta)
                        .ok_or(PadlockError::DurationOutOfRange)?,
                )
            }
            (false, Some(_)) => return Err(PadlockError::UnexpectedDuration { padlock }),
            (false, None) => None,
        };

        let password = match (padlock.is_password_class(), request.password) {
            (true, Some(p)) if !p.is_empty() => Some(p),
            (true, _) => return Err(PadlockError::MissingPassword { padlock }),
            (false, Some(_)) => return Err(PadlockError::UnexpectedPassword { padlock }),
            (false, None) => None,
        };

        Ok(Padlocked::wrap(LockSlot {
            padlock,
            password,
            timer,
            assigner: Some(assigner),
        }))
    }
}

impl Default for Padlocked<Open> {
    fn default() -> Self {
        Self::new()
    }
}

impl Padlocked<Engaged> {
    pub fn padlock(&self) -> Padlock {
        self.slot.padlock
    }

    /// Who engaged the padlock. Always present on an engaged slot that passed
    /// [`LockSlot::check`].
    pub fn assigner(&self) -> Option<&Uid> {
        self.slot.assigner.as_ref()
    }

    pub fn is_assigned_by(&self, uid: &Uid) -> bool {
        self.slot.assigner.as_ref() == Some(uid)
    }

    pub fn timer(&self) -> Option<Timestamp> {
        self.slot.timer
    }

    /// Password-class padlocks require an exact match; other kinds accept anything.
    pub fn check_password(&self, supplied: Option<&str>) -> Result<(), PadlockError> {
        if !self.slot.padlock.is_password_class() {
            return Ok(());
        }
        match (self.slot.password.as_deref(), supplied) {
            (Some(expected), Some(given)) if expected == given => Ok(()),
            _ => Err(PadlockError::WrongPassword),
        }
    }

    /// Release the padlock, clearing every lock column.
    pub fn release(self) -> Padlocked<Open> {
        Padlocked::new()
    }
}

/// A stored slot classified at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Open(Padlocked<Open>),
    Engaged(Padlocked<Engaged>),
    /// Timed-class padlock past its timer; treated as open once cleared.
    Lapsed(Padlocked<Engaged>),
}

impl Observed {
    /// Collapse a lapsed lock into an open one. Returns whether a clear happened.
    pub fn settle(self) -> (Result<Padlocked<Open>, Padlocked<Engaged>>, bool) {
        match self {
            Observed::Open(open) => (Ok(open), false),
            Observed::Lapsed(lapsed) => (Ok(lapsed.release()), true),
            Observed::Engaged(engaged) => (Err(engaged), false),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors when transitioning padlock states.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PadlockError {
    #[error("Padlock kind None cannot be engaged")]
    NoPadlock,

    #[error("{padlock} padlock requires a duration")]
    MissingDuration { padlock: Padlock },

    #[error("Lock duration must be greater than zero")]
    ZeroDuration,

    #[error("Lock duration out of range")]
    DurationOutOfRange,

    #[error("{padlock} padlock does not take a duration")]
    UnexpectedDuration { padlock: Padlock },

    #[error("{padlock} padlock requires a non-empty password")]
    MissingPassword { padlock: Padlock },

    #[error("{padlock} padlock does not take a password")]
    UnexpectedPassword { padlock: Padlock },

    #[error("Supplied password does not match")]
    WrongPassword,

    #[error("Inconsistent {padlock} slot: {reason}")]
    Invariant { padlock: Padlock, reason: String },
}

impl PadlockError {
    /// Convert into the shared taxonomy, attributing the failure to `actor`
    /// acting on `resource`.
    pub fn into_tether(self, actor: &Uid, resource: EntityType) -> TetherError {
        match self {
            PadlockError::WrongPassword => TetherError::Access(AccessError::PermissionDenied {
                actor: actor.to_string(),
                action: "unlock".to_string(),
                resource: resource.table_name().to_string(),
            }),
            PadlockError::Invariant { padlock, reason } => {
                TetherError::invalid_transition(resource, padlock.to_string(), "locked", reason)
            }
            other => TetherError::Validation(ValidationError::InvalidValue {
                field: "padlock".to_string(),
                reason: other.to_string(),
            }),
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn arb_request() -> impl Strategy<Value = LockRequest> {
        (
            0..Padlock::ALL.len(),
            proptest::option::of("[a-z]{0,8}"),
            proptest::option::of(0u64..1_000_000),
        )
            .prop_map(|(i, password, secs)| LockRequest {
                padlock: Padlock::ALL[i],
                password,
                duration: secs.map(Duration::from_secs),
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Whatever the request, an engaged slot satisfies the lock invariant
        /// and any timer lies in the future at write time.
        #[test]
        fn prop_engaged_slots_are_consistent(request in arb_request(), offset in 0i64..2_000_000_000) {
            let now = Utc.timestamp_opt(offset, 0).unwrap();
            if let Ok(engaged) = Padlocked::new().engage(request, Uid::parse("AB12345678").unwrap(), now) {
                let slot = engaged.slot();
                prop_assert!(slot.check().is_ok());
                prop_assert!(slot.assigner.is_some());
                if let Some(timer) = slot.timer {
                    prop_assert!(timer > now);
                }
            }
        }
    }
}
