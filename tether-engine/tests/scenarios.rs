//! End-to-end scenarios across pairing, grants, padlocks and collars.

use std::time::Duration;

use tether_core::{
    CollarAccess, EntityType, GagType, LockSlot, OwnerRemovalPolicy, Padlock, TetherConfig,
};
use tether_engine::Gags;
use tether_test_utils::assertions::{assert_kind, assert_permission_denied};
use tether_test_utils::fixtures::World;
use tether_test_utils::{init_tracing, Capability, ErrorKind, LockRequest, StoreTrait};

const A: &str = "AB12345678";
const Z: &str = "ZZ99999999";

fn ball() -> GagType {
    GagType::new("Ball").unwrap()
}

// ============================================================================
// GRANTS AND PADLOCKS
// ============================================================================

#[test]
fn apply_allowed_but_lock_denied() {
    init_tracing();
    let world = World::new();
    let (a, z) = world.paired(A, Z);
    world.grant(&a, &z, &[Capability::ApplyGags]);

    world.enforcer.apply::<Gags>(&z, &a, 0, ball()).unwrap();
    let result = world.enforcer.lock::<Gags>(
        &z,
        &a,
        0,
        LockRequest::of(Padlock::Timed).with_duration(Duration::from_secs(3600)),
    );
    assert_permission_denied(&result);

    let gag = world.enforcer.read_gag(&a, 0).unwrap();
    assert_eq!(gag.content, Some(ball()));
    assert_eq!(gag.enabler, Some(z));
    assert!(!gag.lock.is_locked());
}

#[test]
fn owner_edits_grant_regardless_of_access() {
    init_tracing();
    let world = World::new();
    let (a, z) = world.paired(A, Z);
    assert!(!world
        .enforcer
        .access_snapshot(&a, &z)
        .unwrap()
        .data
        .allows(Capability::LockGags));

    world
        .enforcer
        .set_grant(&a, &a, &z, Capability::LockGags, tether_core::GrantValue::Flag(true))
        .unwrap();
    let result = world.enforcer.set_grant(
        &z,
        &a,
        &z,
        Capability::LockGags,
        tether_core::GrantValue::Flag(true),
    );
    assert_permission_denied(&result);
}

#[test]
fn password_lock_round_trip() {
    init_tracing();
    let world = World::new();
    let (a, z) = world.paired(A, Z);
    world.grant(
        &a,
        &z,
        &[Capability::ApplyGags, Capability::LockGags, Capability::UnlockGags],
    );
    world.enforcer.apply::<Gags>(&z, &a, 0, ball()).unwrap();
    world
        .enforcer
        .lock::<Gags>(&z, &a, 0, LockRequest::of(Padlock::Password).with_password("peaches"))
        .unwrap();

    let wrong = world.enforcer.unlock::<Gags>(&z, &a, 0, Some("wrong"));
    assert_permission_denied(&wrong);
    assert!(world.enforcer.read_gag(&a, 0).unwrap().lock.is_locked());

    world
        .enforcer
        .unlock::<Gags>(&z, &a, 0, Some("peaches"))
        .unwrap();
    let gag = world.enforcer.read_gag(&a, 0).unwrap();
    assert_eq!(gag.lock, LockSlot::default());
    assert_eq!(gag.content, Some(ball()));
}

#[test]
fn lapsed_timer_clears_on_read() {
    init_tracing();
    let world = World::new();
    let (a, z) = world.paired(A, Z);
    world.grant(&a, &z, &[Capability::ApplyGags, Capability::LockGags]);
    world.grant_value(
        &a,
        &z,
        Capability::MaxGagTime,
        tether_core::GrantValue::Duration(Duration::from_secs(7200)),
    );
    world.enforcer.apply::<Gags>(&z, &a, 1, ball()).unwrap();
    world
        .enforcer
        .lock::<Gags>(
            &z,
            &a,
            1,
            LockRequest::of(Padlock::Timed).with_duration(Duration::from_secs(3600)),
        )
        .unwrap();

    world.clock.advance(Duration::from_secs(3599));
    assert!(world.enforcer.read_gag(&a, 1).unwrap().lock.is_locked());

    world.clock.advance(Duration::from_millis(1500));
    let gag = world.enforcer.read_gag(&a, 1).unwrap();
    assert_eq!(gag.lock.padlock, Padlock::None);
    assert!(gag.lock.timer.is_none());
    assert!(gag.lock.assigner.is_none());

    // The clear was written back, not just hidden.
    let stored = world.store.gag_get(&a, 1).unwrap().unwrap();
    assert!(!stored.data.lock.is_locked());
}

#[test]
fn deleting_assigner_releases_their_locks() {
    init_tracing();
    let world = World::new();
    let (a, z) = world.paired(A, Z);
    world.grant(&a, &z, &[Capability::ApplyGags, Capability::LockGags]);
    world.enforcer.apply::<Gags>(&z, &a, 0, ball()).unwrap();
    world
        .enforcer
        .lock::<Gags>(&z, &a, 0, LockRequest::simple())
        .unwrap();

    let report = world.enforcer.delete_identity(&z).unwrap();
    assert_eq!(report.locks_released, 1);
    assert_eq!(world.store.rows_referencing(&z).unwrap(), 0);

    let gag = world.enforcer.read_gag(&a, 0).unwrap();
    assert!(!gag.lock.is_locked());
    assert_eq!(gag.content, Some(ball()));
}

// ============================================================================
// COLLAR LAST-OWNER REMOVAL
// ============================================================================

fn collared(world: &World) -> (tether_core::Uid, tether_core::Uid) {
    let (a, z) = world.paired(A, Z);
    world
        .enforcer
        .request_collar(&z, &a, "terms", false, CollarAccess::all())
        .unwrap();
    world.enforcer.accept_collar(&a, &z).unwrap();
    (a, z)
}

#[test]
fn last_owner_removal_restricted_by_default() {
    init_tracing();
    let world = World::new();
    let (a, z) = collared(&world);

    let result = world.enforcer.remove_owner(&z, &a, &z);
    assert_kind(&result, ErrorKind::ConstraintViolation);
    assert!(world.enforcer.read_collar(&a).unwrap().is_some());
    assert_eq!(world.enforcer.collar_owners(&a).unwrap().len(), 1);

    let removal = world.enforcer.force_remove_owner(&a, &z).unwrap();
    assert!(removal.collar_removed);
    assert_eq!(world.store.count(EntityType::CollarState).unwrap(), 0);
}

#[test]
fn last_owner_removal_cascades_when_configured() {
    init_tracing();
    let world = World::with_config(TetherConfig {
        owner_removal_policy: OwnerRemovalPolicy::Cascade,
        ..TetherConfig::default()
    });
    let (a, z) = collared(&world);

    let removal = world.enforcer.remove_owner(&a, &a, &z).unwrap();
    assert!(removal.collar_removed);
    assert_eq!(removal.remaining_owners, 0);
    assert!(world.enforcer.read_collar(&a).unwrap().is_none());
    assert_eq!(world.store.count(EntityType::CollarOwner).unwrap(), 0);
}

#[test]
fn deleting_last_owner_removes_orphaned_collar() {
    init_tracing();
    let world = World::new();
    let (a, z) = collared(&world);

    let report = world.enforcer.delete_identity(&z).unwrap();
    assert_eq!(report.orphaned_collars_removed, 1);
    assert!(world.enforcer.read_collar(&a).unwrap().is_none());
}
