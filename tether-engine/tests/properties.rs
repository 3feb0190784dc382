//! Property-based tests for the permission model.
//!
//! Each property runs against a fresh in-memory world with a manual clock.

use std::time::Duration;

use proptest::prelude::*;
use tether_core::{CollarAccess, GagType, GrantValue, LockSlot, Padlock};
use tether_engine::{Gags, Restrictions};
use tether_test_utils::assertions::{assert_lock_consistent, assert_permission_denied};
use tether_test_utils::fixtures::World;
use tether_test_utils::generators::{arb_grant_write, arb_lock_request, arb_uid_pair};
use tether_test_utils::{Capability, LockRequest, StoreTrait};

const A: &str = "AB12345678";
const B: &str = "ZZ99999999";

/// Every gag capability, trust grants and a generous max time, from A to B.
fn fully_trusted(world: &World) -> (tether_core::Uid, tether_core::Uid) {
    let (a, b) = world.paired(A, B);
    world.grant(
        &a,
        &b,
        &[
            Capability::ApplyGags,
            Capability::LockGags,
            Capability::UnlockGags,
            Capability::RemoveGags,
            Capability::OwnerLocks,
            Capability::DevotionalLocks,
            Capability::PermanentLocks,
        ],
    );
    world.grant_value(
        &a,
        &b,
        Capability::MaxGagTime,
        GrantValue::Duration(Duration::from_secs(7 * 24 * 3600)),
    );
    (a, b)
}

fn stored_gag_lock(world: &World, owner: &tether_core::Uid) -> LockSlot {
    world
        .store
        .gag_get(owner, 0)
        .unwrap()
        .map(|row| row.data.lock)
        .unwrap_or_default()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Writing Grant[A,B] leaves Grant[B,A] untouched.
    #[test]
    fn prop_grant_directions_independent((cap, value) in arb_grant_write()) {
        let world = World::new();
        let (a, b) = world.paired(A, B);
        let reverse = world.enforcer.grant_snapshot(&b, &a).unwrap();

        let _ = world.enforcer.set_grant(&a, &a, &b, cap, value);

        prop_assert_eq!(world.enforcer.grant_snapshot(&b, &a).unwrap(), reverse);
    }

    /// Without the access bit a partner cannot edit their own grant.
    #[test]
    fn prop_access_gates_partner_edits((cap, value) in arb_grant_write()) {
        let world = World::new();
        let (a, b) = world.paired(A, B);
        let before = world.enforcer.grant_snapshot(&a, &b).unwrap();

        assert_permission_denied(&world.enforcer.set_grant(&b, &a, &b, cap, value));
        prop_assert_eq!(world.enforcer.grant_snapshot(&a, &b).unwrap(), before);
    }

    /// A partner can never flip their own access bits.
    #[test]
    fn prop_no_self_escalation((cap, _) in arb_grant_write(), editable in any::<bool>()) {
        let world = World::new();
        let (a, b) = world.paired(A, B);
        assert_permission_denied(&world.enforcer.set_access(&b, &a, &b, cap, editable));
        prop_assert!(world.enforcer.access_snapshot(&a, &b).unwrap().data.editable.is_empty());
    }

    /// No sequence of lock and unlock attempts stores a malformed slot.
    #[test]
    fn prop_stored_locks_consistent(
        requests in proptest::collection::vec(arb_lock_request(), 1..8),
        advance_secs in 0u64..100_000,
    ) {
        let world = World::new();
        let (a, b) = fully_trusted(&world);
        world
            .enforcer
            .apply::<Gags>(&b, &a, 0, GagType::new("Ball").unwrap())
            .unwrap();

        for request in requests {
            let password = request.password.clone();
            let _ = world.enforcer.lock::<Gags>(&b, &a, 0, request);
            assert_lock_consistent(&stored_gag_lock(&world, &a));

            world.clock.advance(Duration::from_secs(advance_secs));
            let _ = world.enforcer.unlock::<Gags>(&b, &a, 0, password.as_deref());
            assert_lock_consistent(&stored_gag_lock(&world, &a));
        }
    }

    /// A timed lock reads as locked until its timer and open right after.
    #[test]
    fn prop_lazy_expiry(secs in 1u64..86_400, epsilon_ms in 1u64..5_000, timed_password in any::<bool>()) {
        let world = World::new();
        let (a, b) = fully_trusted(&world);
        world
            .enforcer
            .apply::<Gags>(&b, &a, 0, GagType::new("Ball").unwrap())
            .unwrap();
        let request = if timed_password {
            LockRequest::of(Padlock::TimedPassword).with_password("pw")
        } else {
            LockRequest::of(Padlock::Timed)
        };
        world
            .enforcer
            .lock::<Gags>(&b, &a, 0, request.with_duration(Duration::from_secs(secs)))
            .unwrap();

        world.clock.advance(Duration::from_secs(secs - 1));
        prop_assert!(world.enforcer.read_gag(&a, 0).unwrap().lock.is_locked());

        world.clock.advance(Duration::from_secs(1) + Duration::from_millis(epsilon_ms));
        let gag = world.enforcer.read_gag(&a, 0).unwrap();
        prop_assert_eq!(gag.lock, LockSlot::default());
        prop_assert_eq!(stored_gag_lock(&world, &a), LockSlot::default());
    }

    /// Deleting an identity leaves nothing that references it.
    #[test]
    fn prop_cascade_complete(
        (x, y) in arb_uid_pair(),
        gag_layers in 0u8..3,
        restrictions in 0u8..3,
        collar_x in any::<bool>(),
        x_owns_y in any::<bool>(),
    ) {
        let world = World::new();
        let x = world.register(x.as_str());
        let y = world.register(y.as_str());
        world.enforcer.create_pair(&x, &y).unwrap();
        world.grant(&y, &x, &[Capability::ApplyGags, Capability::LockGags]);
        world.grant(&x, &y, &[Capability::ApplyRestrictions]);

        for layer in 0..gag_layers {
            world.enforcer.apply::<Gags>(&x, &y, layer, GagType::new("Ring").unwrap()).unwrap();
            world.enforcer.lock::<Gags>(&x, &y, layer, LockRequest::simple()).unwrap();
            world.enforcer.apply::<Gags>(&x, &x, layer, GagType::new("Tape").unwrap()).unwrap();
        }
        for layer in 0..restrictions {
            world
                .enforcer
                .apply::<Restrictions>(&y, &x, layer, tether_core::new_entity_id())
                .unwrap();
        }
        if collar_x {
            world.enforcer.request_collar(&y, &x, "", false, CollarAccess::all()).unwrap();
            world.enforcer.accept_collar(&x, &y).unwrap();
        }
        if x_owns_y {
            world.enforcer.request_collar(&x, &y, "", true, CollarAccess::all()).unwrap();
            world.enforcer.accept_collar(&y, &x).unwrap();
        } else {
            world.enforcer.request_collar(&x, &y, "", true, CollarAccess::all()).unwrap();
        }

        world.enforcer.delete_identity(&x).unwrap();

        prop_assert_eq!(world.store.rows_referencing(&x).unwrap(), 0);
        for layer in 0..gag_layers {
            let gag = world.enforcer.read_gag(&y, layer).unwrap();
            prop_assert!(!gag.lock.is_locked());
        }
        prop_assert!(world.enforcer.pairs_of(&y).unwrap().is_empty());
        prop_assert!(world.enforcer.read_collar(&y).unwrap().is_none());
    }
}
