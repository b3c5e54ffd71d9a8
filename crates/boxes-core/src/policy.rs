//! Authorization policy, one function per operation.
//!
//! Authentication happens before any of these run; an `Actor` is always an
//! authenticated user.

use crate::errors::Forbidden;
use crate::model::{Actor, BoxRecord};

pub fn authorize_add(actor: &Actor) -> Result<(), Forbidden> {
    require_staff(actor)
}

/// Any staff user may update any box; ownership is not required.
pub fn authorize_update(actor: &Actor) -> Result<(), Forbidden> {
    require_staff(actor)
}

/// Only the owner may delete. Staff status does not override this.
pub fn authorize_delete(actor: &Actor, record: &BoxRecord) -> Result<(), Forbidden> {
    if record.is_owned_by(actor.id) {
        Ok(())
    } else {
        Err(Forbidden)
    }
}

pub fn authorize_list(_actor: &Actor) -> Result<(), Forbidden> {
    Ok(())
}

/// Listing one's own boxes is staff-only, stricter than listing all boxes.
pub fn authorize_list_own(actor: &Actor) -> Result<(), Forbidden> {
    require_staff(actor)
}

fn require_staff(actor: &Actor) -> Result<(), Forbidden> {
    if actor.is_staff {
        Ok(())
    } else {
        Err(Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BoxId, UserId};
    use crate::model::Owner;
    use chrono::Utc;

    fn actor(id: i64, is_staff: bool) -> Actor {
        Actor {
            id: UserId::from_raw(id),
            username: format!("user{id}"),
            is_staff,
        }
    }

    fn owned_by(id: i64) -> BoxRecord {
        let now = Utc::now();
        BoxRecord {
            id: BoxId::from_raw(1),
            owner: Owner {
                id: UserId::from_raw(id),
                username: format!("user{id}"),
            },
            length: 1.0,
            breadth: 1.0,
            height: 1.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn staff_gates() {
        let staff = actor(1, true);
        let regular = actor(2, false);
        assert!(authorize_add(&staff).is_ok());
        assert_eq!(authorize_add(&regular), Err(Forbidden));
        assert!(authorize_update(&staff).is_ok());
        assert_eq!(authorize_update(&regular), Err(Forbidden));
        assert!(authorize_list_own(&staff).is_ok());
        assert_eq!(authorize_list_own(&regular), Err(Forbidden));
    }

    #[test]
    fn anyone_authenticated_can_list() {
        assert!(authorize_list(&actor(2, false)).is_ok());
    }

    #[test]
    fn delete_requires_exact_owner() {
        let record = owned_by(1);
        assert!(authorize_delete(&actor(1, false), &record).is_ok());
        assert_eq!(authorize_delete(&actor(2, false), &record), Err(Forbidden));
    }

    #[test]
    fn staff_does_not_override_ownership_on_delete() {
        assert_eq!(authorize_delete(&actor(9, true), &owned_by(1)), Err(Forbidden));
    }
}
