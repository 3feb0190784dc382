//! Tether Test Utilities
//!
//! Shared test infrastructure for the Tether workspace:
//! - Proptest generators for identities, capabilities and padlock requests
//! - A `World` fixture wiring an enforcer to an in-memory store and a
//!   manually driven clock
//! - Assertions over the error taxonomy and the lock invariant

use std::sync::Arc;

pub use tether_core::{
    Capability, Clock, ErrorKind, GrantKind, GrantValue, LockRequest, LockSlot, ManualClock,
    MoodlePerms, OwnerRemovalPolicy, Padlock, PuppetPerms, TetherConfig, TetherError,
    TetherResult, Tier, Timestamp, Uid,
};
pub use tether_engine::Enforcer;
pub use tether_storage::{MemoryStore, StoreTrait};

/// Install a fmt subscriber filtered by `RUST_LOG`. Safe to call from every
/// test; only the first call installs.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tether types.

    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    // === Identity Generators ===

    /// A syntactically valid uid.
    pub fn arb_uid() -> impl Strategy<Value = Uid> {
        "[A-Z0-9]{10}".prop_filter_map("valid uid", |s| Uid::parse(&s).ok())
    }

    /// Two distinct uids.
    pub fn arb_uid_pair() -> impl Strategy<Value = (Uid, Uid)> {
        (arb_uid(), arb_uid()).prop_filter("distinct", |(a, b)| a != b)
    }

    // === Catalog Generators ===

    pub fn arb_capability() -> impl Strategy<Value = Capability> {
        (0..Capability::ALL.len()).prop_map(|i| Capability::ALL[i])
    }

    /// A value of the right kind for `capability`.
    pub fn arb_grant_value_for(capability: Capability) -> BoxedStrategy<GrantValue> {
        match capability.kind() {
            GrantKind::Flag => any::<bool>().prop_map(GrantValue::Flag).boxed(),
            GrantKind::Duration => (0u64..=7 * 24 * 3600)
                .prop_map(|secs| GrantValue::Duration(Duration::from_secs(secs)))
                .boxed(),
            GrantKind::Puppet => any::<u8>()
                .prop_map(|bits| GrantValue::Puppet(PuppetPerms::from_bits_truncate(bits)))
                .boxed(),
            GrantKind::Moodle => any::<u8>()
                .prop_map(|bits| GrantValue::Moodle(MoodlePerms::from_bits_truncate(bits)))
                .boxed(),
            GrantKind::Intensity => (0u8..=100).prop_map(GrantValue::Intensity).boxed(),
            GrantKind::Text => "[a-z0-9]{0,12}".prop_map(GrantValue::Text).boxed(),
        }
    }

    /// A capability together with a value of its kind.
    pub fn arb_grant_write() -> impl Strategy<Value = (Capability, GrantValue)> {
        arb_capability().prop_flat_map(|cap| arb_grant_value_for(cap).prop_map(move |v| (cap, v)))
    }

    // === Padlock Generators ===

    pub fn arb_padlock() -> impl Strategy<Value = Padlock> {
        (0..Padlock::ALL.len()).prop_map(|i| Padlock::ALL[i])
    }

    /// Any request, well-formed or not. Useful for checking that nothing
    /// malformed ever reaches storage.
    pub fn arb_lock_request() -> impl Strategy<Value = LockRequest> {
        (
            arb_padlock(),
            proptest::option::of("[a-z]{0,8}"),
            proptest::option::of(0u64..200_000),
        )
            .prop_map(|(padlock, password, secs)| LockRequest {
                padlock,
                password,
                duration: secs.map(Duration::from_secs),
            })
    }

    /// A request shaped correctly for its padlock kind.
    pub fn arb_valid_lock_request() -> impl Strategy<Value = LockRequest> {
        (arb_padlock(), "[a-z]{1,8}", 1u64..86_400)
            .prop_filter("a padlock", |(padlock, _, _)| !padlock.is_none())
            .prop_map(|(padlock, password, secs)| {
                let mut request = LockRequest::of(padlock);
                if padlock.is_password_class() {
                    request = request.with_password(password);
                }
                if padlock.is_timed_class() {
                    request = request.with_duration(Duration::from_secs(secs));
                }
                request
            })
    }

    // === Config Generators ===

    pub fn arb_valid_config() -> impl Strategy<Value = TetherConfig> {
        (
            1u8..=tether_core::MAX_GAG_LAYERS,
            1u8..=tether_core::MAX_RESTRICTION_LAYERS,
            3_600u64..=365 * 24 * 3600,
            any::<bool>(),
            any::<bool>(),
            0u32..8,
        )
            .prop_flat_map(|(gags, restrictions, max_secs, cascade, release, retries)| {
                (1u64..=max_secs).prop_map(move |self_secs| TetherConfig {
                    gag_layers: gags,
                    restriction_layers: restrictions,
                    max_lock_duration: Duration::from_secs(max_secs),
                    max_self_lock_duration: Duration::from_secs(self_secs),
                    owner_removal_policy: if cascade {
                        OwnerRemovalPolicy::Cascade
                    } else {
                        OwnerRemovalPolicy::Restrict
                    },
                    release_locks_on_unpair: release,
                    conflict_retries: retries,
                })
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! A ready-to-use enforcer over an in-memory store.

    use super::*;

    /// Fixed start instant so timer arithmetic in tests is reproducible.
    pub fn epoch() -> Timestamp {
        chrono::DateTime::from_timestamp(1_767_225_600, 0).unwrap_or_else(chrono::Utc::now)
    }

    /// Store, clock and enforcer sharing one world.
    pub struct World {
        pub store: Arc<MemoryStore>,
        pub clock: Arc<ManualClock>,
        pub enforcer: Enforcer<MemoryStore>,
    }

    impl World {
        pub fn new() -> Self {
            Self::with_config(TetherConfig::default())
        }

        /// # Panics
        /// If `config` does not validate.
        pub fn with_config(config: TetherConfig) -> Self {
            let store = Arc::new(MemoryStore::new());
            let clock = Arc::new(ManualClock::new(epoch()));
            let enforcer = match Enforcer::new(store.clone(), clock.clone(), config) {
                Ok(enforcer) => enforcer,
                Err(e) => panic!("invalid test config: {}", e),
            };
            Self {
                store,
                clock,
                enforcer,
            }
        }

        pub fn now(&self) -> Timestamp {
            self.clock.now()
        }

        /// # Panics
        /// If `raw` is not a valid uid or registration fails.
        pub fn register(&self, raw: &str) -> Uid {
            let uid = match Uid::parse(raw) {
                Ok(uid) => uid,
                Err(e) => panic!("bad fixture uid {}: {}", raw, e),
            };
            if let Err(e) = self.enforcer.register_user(&uid, None, Tier::Free) {
                panic!("register {} failed: {}", raw, e);
            }
            uid
        }

        /// Register both identities and pair them.
        pub fn paired(&self, a: &str, b: &str) -> (Uid, Uid) {
            let (a, b) = (self.register(a), self.register(b));
            if let Err(e) = self.enforcer.create_pair(&a, &b) {
                panic!("pair {} {} failed: {}", a, b, e);
            }
            (a, b)
        }

        /// `owner` grants `partner` each capability as a flag.
        pub fn grant(&self, owner: &Uid, partner: &Uid, caps: &[Capability]) {
            for cap in caps {
                self.grant_value(owner, partner, *cap, GrantValue::Flag(true));
            }
        }

        pub fn grant_value(&self, owner: &Uid, partner: &Uid, cap: Capability, value: GrantValue) {
            if let Err(e) = self.enforcer.set_grant(owner, owner, partner, cap, value) {
                panic!("grant {} failed: {}", cap, e);
            }
        }
    }

    impl Default for World {
        fn default() -> Self {
            Self::new()
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over Tether results and persisted state.

    use super::*;

    /// Assert that a result failed with the given kind.
    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &TetherResult<T>, expected: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), expected, "wrong error kind: {:?}", e),
            Ok(v) => panic!("Expected {:?}, got Ok({:?})", expected, v),
        }
    }

    #[track_caller]
    pub fn assert_permission_denied<T: std::fmt::Debug>(result: &TetherResult<T>) {
        assert_kind(result, ErrorKind::PermissionDenied);
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &TetherResult<T>) {
        assert_kind(result, ErrorKind::NotFound);
    }

    /// Assert that a stored lock slot satisfies the padlock invariant.
    #[track_caller]
    pub fn assert_lock_consistent(slot: &LockSlot) {
        if let Err(e) = slot.check() {
            panic!("lock slot violates invariant: {} ({:?})", e, slot);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_world_fixture() {
        let world = fixtures::World::new();
        let (a, b) = world.paired("AB12345678", "ZZ99999999");
        assert_eq!(world.now(), fixtures::epoch());
        world.grant(&a, &b, &[Capability::ApplyGags]);
        assert!(world
            .enforcer
            .resolve(&a, &b, Capability::ApplyGags)
            .unwrap()
            .is_granted());
    }

    #[test]
    fn test_assert_kind() {
        let result: TetherResult<()> =
            Err(TetherError::permission_denied("AB12345678", "apply", "gag_state"));
        assertions::assert_permission_denied(&result);
    }

    #[test]
    #[should_panic(expected = "Expected NotFound")]
    fn test_assert_kind_rejects_ok() {
        assertions::assert_not_found(&Ok::<u8, TetherError>(1));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_generated_config_is_valid(config in generators::arb_valid_config()) {
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_generated_grant_write_matches_kind((cap, value) in generators::arb_grant_write()) {
            prop_assert_eq!(cap.kind(), value.kind());
        }

        #[test]
        fn prop_valid_request_engages(request in generators::arb_valid_lock_request(), uid in generators::arb_uid()) {
            let engaged = tether_core::Padlocked::new().engage(request, uid, fixtures::epoch());
            prop_assert!(engaged.is_ok());
            if let Ok(engaged) = engaged {
                assertions::assert_lock_consistent(engaged.slot());
            }
        }
    }
}
