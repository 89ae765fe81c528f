use anyhow::Result;
use chronik_db::Database;
use chronik_db::models::TimelineRow;
use chronik_types::models::{Role, Visibility};
use uuid::Uuid;

/// The caller's standing, resolved once per request. The site-owner
/// capability lives here as an explicit flag so no handler ever compares
/// identities to decide privilege.
pub struct Actor {
    pub user_id: Uuid,
    pub role: Option<Role>,
    pub site_owner: bool,
}

/// Expected denials. These are values, not faults: a denied action answers
/// with a reason, never a 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deny {
    InsufficientRank,
    SelfAction,
    NotAMember,
}

impl Actor {
    fn effective_rank(&self) -> Option<u8> {
        if self.site_owner {
            return Some(Role::SiteOwner.rank());
        }
        self.role.map(Role::rank)
    }
}

/// Remove/block/unblock/approve: the actor must hold moderator rank or
/// better, must strictly outrank the target, and may never target
/// themselves. The moderator floor matters for low-rank targets: a plain
/// member outranks a pending applicant but still may not approve them.
/// The site-owner capability bypasses the rank comparison but not the
/// self-action prohibition.
pub fn check_admin_action(actor: &Actor, target_user_id: Uuid, target_role: Role) -> Result<(), Deny> {
    if actor.user_id == target_user_id {
        return Err(Deny::SelfAction);
    }
    if actor.site_owner {
        return Ok(());
    }
    let Some(rank) = actor.effective_rank() else {
        return Err(Deny::NotAMember);
    };
    if rank >= Role::Moderator.rank() && rank > target_role.rank() {
        Ok(())
    } else {
        Err(Deny::InsufficientRank)
    }
}

/// Privileged listings and report handling require moderator or better.
pub fn require_moderator(actor: &Actor) -> Result<(), Deny> {
    match actor.effective_rank() {
        Some(rank) if rank >= Role::Moderator.rank() => Ok(()),
        Some(_) => Err(Deny::InsufficientRank),
        None => Err(Deny::NotAMember),
    }
}

/// Timeline settings changes require admin or better.
pub fn require_admin(actor: &Actor) -> Result<(), Deny> {
    match actor.effective_rank() {
        Some(rank) if rank >= Role::Admin.rank() => Ok(()),
        Some(_) => Err(Deny::InsufficientRank),
        None => Err(Deny::NotAMember),
    }
}

/// Viewing a timeline's members: public timelines are open to any
/// authenticated caller, private ones to active members only.
pub fn can_view(actor: &Actor, timeline: &TimelineRow) -> bool {
    if actor.site_owner || timeline.visibility == Visibility::Public.as_str() {
        return true;
    }
    actor.role.is_some()
}

/// Load the actor's standing for one timeline: explicit active membership
/// role, implicit creator role when no row exists, and the site-owner flag.
pub fn resolve_actor(db: &Database, timeline: &TimelineRow, user_id: Uuid) -> Result<Actor> {
    let uid = user_id.to_string();
    let site_owner = db.is_site_owner(&uid)?;

    let role = match db.get_membership(&timeline.id, &uid)? {
        Some(m) if m.is_active => Role::parse(&m.role),
        Some(_) => None,
        None if timeline.created_by == uid => Some(Role::Creator),
        None => None,
    };

    Ok(Actor {
        user_id,
        role,
        site_owner,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: [Role; 6] = [
        Role::Pending,
        Role::Member,
        Role::Moderator,
        Role::Admin,
        Role::Creator,
        Role::SiteOwner,
    ];

    fn actor(role: Option<Role>, site_owner: bool) -> Actor {
        Actor {
            user_id: Uuid::new_v4(),
            role,
            site_owner,
        }
    }

    #[test]
    fn admin_action_needs_moderator_rank_and_strict_dominance() {
        let target = Uuid::new_v4();
        for actor_role in ROLES {
            for target_role in ROLES {
                let a = actor(Some(actor_role), false);
                let result = check_admin_action(&a, target, target_role);
                let allowed = actor_role.rank() >= Role::Moderator.rank()
                    && actor_role.rank() > target_role.rank();
                if allowed {
                    assert!(result.is_ok(), "{:?} should dominate {:?}", actor_role, target_role);
                } else {
                    assert_eq!(
                        result,
                        Err(Deny::InsufficientRank),
                        "{:?} must not act on {:?}",
                        actor_role,
                        target_role
                    );
                }
            }
        }
    }

    #[test]
    fn plain_member_cannot_approve_a_pending_applicant() {
        // A member outranks a pending applicant but approval is still a
        // privileged action.
        let a = actor(Some(Role::Member), false);
        assert_eq!(
            check_admin_action(&a, Uuid::new_v4(), Role::Pending),
            Err(Deny::InsufficientRank)
        );
        assert!(check_admin_action(&actor(Some(Role::Moderator), false), Uuid::new_v4(), Role::Pending).is_ok());
    }

    #[test]
    fn self_action_is_always_denied() {
        for role in ROLES {
            let a = actor(Some(role), false);
            assert_eq!(
                check_admin_action(&a, a.user_id, Role::Member),
                Err(Deny::SelfAction)
            );
        }
        // Even the site-owner capability does not allow self-targeting.
        let a = actor(None, true);
        assert_eq!(
            check_admin_action(&a, a.user_id, Role::Member),
            Err(Deny::SelfAction)
        );
    }

    #[test]
    fn site_owner_capability_bypasses_rank() {
        let a = actor(None, true);
        for target_role in ROLES {
            assert!(check_admin_action(&a, Uuid::new_v4(), target_role).is_ok());
        }
    }

    #[test]
    fn non_member_is_denied_with_a_distinct_reason() {
        let a = actor(None, false);
        assert_eq!(
            check_admin_action(&a, Uuid::new_v4(), Role::Member),
            Err(Deny::NotAMember)
        );
        assert_eq!(require_moderator(&a), Err(Deny::NotAMember));
    }

    #[test]
    fn moderator_gate_admits_moderator_and_above() {
        assert!(require_moderator(&actor(Some(Role::Moderator), false)).is_ok());
        assert!(require_moderator(&actor(Some(Role::Admin), false)).is_ok());
        assert!(require_moderator(&actor(Some(Role::Creator), false)).is_ok());
        assert!(require_moderator(&actor(None, true)).is_ok());
        assert_eq!(
            require_moderator(&actor(Some(Role::Member), false)),
            Err(Deny::InsufficientRank)
        );
        assert_eq!(
            require_moderator(&actor(Some(Role::Pending), false)),
            Err(Deny::InsufficientRank)
        );
    }
}
