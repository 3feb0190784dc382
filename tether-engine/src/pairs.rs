//! Pair directory: identities and the directed edges between them.

use tether_core::{
    EntityType, GlobalPermissions, PairEdge, TetherError, TetherResult, Tier, Uid, User,
    ValidationError,
};
use tether_storage::{CascadeReport, PairRemoval, StoreTrait};

use crate::{retry_on_conflict, Enforcer};

impl<S: StoreTrait> Enforcer<S> {
    /// Create an identity together with its default global permissions.
    pub fn register_user(&self, uid: &Uid, alias: Option<String>, tier: Tier) -> TetherResult<User> {
        let user = User::new(uid.clone(), alias, tier, self.now());
        self.store
            .user_register(&user, &GlobalPermissions::new(uid.clone()))?;
        tracing::info!(%uid, tier = %tier, "Registered identity");
        Ok(user)
    }

    /// Stamp `last_login` with the current time.
    pub fn touch_login(&self, uid: &Uid) -> TetherResult<User> {
        retry_on_conflict(self.attempts(), || {
            let row = self
                .store
                .user_get(uid)?
                .ok_or_else(|| TetherError::not_found(EntityType::User, uid))?;
            let mut user = row.data;
            user.last_login = Some(self.now());
            self.store.user_update(row.version, &user)?;
            Ok(user)
        })
    }

    /// Pair `a` and `b`: both directed edges with fully-off grant and access rows.
    pub fn create_pair(&self, a: &Uid, b: &Uid) -> TetherResult<()> {
        if a == b {
            return Err(ValidationError::InvalidValue {
                field: "partner".to_string(),
                reason: "an identity cannot pair with itself".to_string(),
            }
            .into());
        }
        self.store.pair_create(a, b, self.now())?;
        tracing::info!(%a, %b, "Paired identities");
        Ok(())
    }

    /// Unpair `a` and `b`, dropping both directions' grant and access rows.
    pub fn remove_pair(&self, a: &Uid, b: &Uid) -> TetherResult<PairRemoval> {
        let removal = self
            .store
            .pair_remove(a, b, self.config.release_locks_on_unpair)?;
        tracing::info!(
            %a,
            %b,
            locks_released = removal.locks_released,
            overrides_released = removal.overrides_released,
            "Unpaired identities"
        );
        Ok(removal)
    }

    /// Delete an identity and everything that references it.
    pub fn delete_identity(&self, uid: &Uid) -> TetherResult<CascadeReport> {
        let report = self.store.user_delete(uid)?;
        tracing::info!(
            %uid,
            edges = report.edges_removed,
            grants = report.grants_removed,
            layers = report.layers_removed,
            collar_removed = report.collar_removed,
            orphaned_collars = report.orphaned_collars_removed,
            locks_released = report.locks_released,
            overrides_released = report.overrides_released,
            "Deleted identity"
        );
        Ok(report)
    }

    /// Outgoing edges of `uid`.
    pub fn pairs_of(&self, uid: &Uid) -> TetherResult<Vec<PairEdge>> {
        self.store.pair_edges_of(uid)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use tether_core::{Capability, Clock, ErrorKind, GrantValue, Tier};
    use tether_storage::StoreTrait;

    #[test]
    fn test_register_twice_is_constraint_violation() {
        let h = harness();
        let a = h.user("AB12345678");
        let err = h.enforcer.register_user(&a, None, Tier::Free).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert!(h.enforcer.store().globals_get(&a).unwrap().is_some());
    }

    #[test]
    fn test_touch_login_bumps_version() {
        let h = harness();
        let a = h.user("AB12345678");
        let user = h.enforcer.touch_login(&a).unwrap();
        assert_eq!(user.last_login, Some(h.clock.now()));
        assert_eq!(h.enforcer.store().user_get(&a).unwrap().unwrap().version, 2);

        let err = h.enforcer.touch_login(&uid("GH00000000")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_create_pair_errors() {
        let h = harness();
        let a = h.user("AB12345678");
        let b = h.user("ZZ99999999");

        assert_eq!(
            h.enforcer.create_pair(&a, &a).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            h.enforcer
                .create_pair(&a, &uid("GH00000000"))
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        h.enforcer.create_pair(&a, &b).unwrap();
        assert_eq!(
            h.enforcer.create_pair(&b, &a).unwrap_err().kind(),
            ErrorKind::ConstraintViolation
        );
        assert_eq!(h.enforcer.pairs_of(&a).unwrap().len(), 1);
        assert_eq!(h.enforcer.pairs_of(&b).unwrap()[0].partner, a);
    }

    #[test]
    fn test_remove_pair_drops_grants() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_flags(&a, &b, &[Capability::ApplyGags]);

        h.enforcer.remove_pair(&b, &a).unwrap();
        assert!(h.enforcer.pairs_of(&a).unwrap().is_empty());
        assert_eq!(
            h.enforcer
                .resolve(&a, &b, Capability::ApplyGags)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            h.enforcer.remove_pair(&a, &b).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_repair_starts_from_defaults() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        h.grant_flags(&a, &b, &[Capability::LockGags]);
        h.enforcer.remove_pair(&a, &b).unwrap();
        h.enforcer.create_pair(&a, &b).unwrap();
        assert_eq!(
            h.enforcer.resolve(&a, &b, Capability::LockGags).unwrap(),
            GrantValue::Flag(false)
        );
    }

    #[test]
    fn test_delete_identity_reports_cascade() {
        let h = harness();
        let (a, b) = h.pair("AB12345678", "ZZ99999999");
        let c = h.user("CC00000000");
        h.enforcer.create_pair(&a, &c).unwrap();

        let report = h.enforcer.delete_identity(&a).unwrap();
        assert_eq!(report.edges_removed, 4);
        assert_eq!(report.grants_removed, 4);
        assert!(h.enforcer.pairs_of(&b).unwrap().is_empty());
        assert!(h.enforcer.pairs_of(&c).unwrap().is_empty());
        assert_eq!(
            h.enforcer.delete_identity(&a).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
