//! # Authorization Gate
//!
//! Decides whether an actor may invoke an event on a transfer.
//!
//! ## Capability Table
//! ```text
//! (kind, event) ──► [(role, scope), ...]
//!
//!   scope ANY          role alone is enough
//!   scope ORIGIN       actor must belong to the transfer's origin
//!   scope DESTINATION  actor must belong to the transfer's destination
//!
//! super_admin  bypasses the table
//! view_only    is never listed, so it can mutate nothing
//! ```
//!
//! All role checks live in this one table so the rule set can be read and
//! tested on its own.

use crate::error::{CoreError, CoreResult};
use crate::state_machine::TransferEvent;
use crate::types::{Actor, Role, Transfer, TransferKind};

// =============================================================================
// Capabilities
// =============================================================================

/// Which organization the actor must belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Any,
    Origin,
    Destination,
}

/// One permitted (role, scope) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub role: Role,
    pub scope: Scope,
}

const fn grant(role: Role, scope: Scope) -> Grant {
    Grant { role, scope }
}

const NATIONAL: Grant = grant(Role::NationalManager, Scope::Any);
const WAREHOUSE_ORIGIN: Grant = grant(Role::WarehouseManager, Scope::Origin);
const WAREHOUSE_DESTINATION: Grant = grant(Role::WarehouseManager, Scope::Destination);
const COUNCIL_ORIGIN: Grant = grant(Role::CouncilOfficer, Scope::Origin);
const COUNCIL_DESTINATION: Grant = grant(Role::CouncilOfficer, Scope::Destination);
const SCHOOL_DESTINATION: Grant = grant(Role::SchoolRepresentative, Scope::Destination);

/// Grants for `(kind, event)`.
pub fn grants(kind: TransferKind, event: TransferEvent) -> &'static [Grant] {
    use TransferEvent as E;
    use TransferKind as K;

    match (kind, event) {
        // Supplier receipts are recorded by the receiving warehouse and
        // validated by national management.
        (K::SupplierReceipt, E::Create | E::Cancel) => &[WAREHOUSE_DESTINATION, NATIONAL],
        (K::SupplierReceipt, E::Receive) => &[WAREHOUSE_DESTINATION],
        (K::SupplierReceipt, E::Validate) => &[NATIONAL],
        (K::SupplierReceipt, E::Dispatch | E::MarkInTransit | E::Deliver) => &[],

        // Shipments leaving a warehouse.
        (
            K::DirectShipment | K::CouncilShipment,
            E::Create | E::Dispatch | E::MarkInTransit | E::Deliver | E::Cancel,
        ) => &[WAREHOUSE_ORIGIN, NATIONAL],
        (K::DirectShipment, E::Receive) => &[SCHOOL_DESTINATION],
        (K::CouncilShipment, E::Receive) => &[COUNCIL_DESTINATION],
        (K::DirectShipment | K::CouncilShipment, E::Validate) => &[NATIONAL, WAREHOUSE_ORIGIN],

        // Distributions leaving a council.
        (K::Distribution, E::Create | E::Dispatch | E::MarkInTransit | E::Deliver | E::Cancel) => {
            &[COUNCIL_ORIGIN, NATIONAL]
        }
        (K::Distribution, E::Receive) => &[SCHOOL_DESTINATION],
        (K::Distribution, E::Validate) => &[NATIONAL, COUNCIL_ORIGIN],
    }
}

// =============================================================================
// Gate
// =============================================================================

fn in_scope(actor: &Actor, scope: Scope, transfer: &Transfer) -> bool {
    match scope {
        Scope::Any => true,
        Scope::Origin => actor.belongs_to(&transfer.origin),
        Scope::Destination => actor.belongs_to(&transfer.destination),
    }
}

/// Checks an actor against the capability table.
///
/// ## Errors
/// `Authorization` with the reason: the role is not granted the event for
/// this kind, or it is granted but the transfer is outside the actor's
/// organization.
pub fn authorize(
    actor: &Actor,
    kind: TransferKind,
    event: TransferEvent,
    transfer: &Transfer,
) -> CoreResult<()> {
    if actor.role == Role::SuperAdmin {
        return Ok(());
    }

    let denied = |reason: String| CoreError::Authorization {
        actor_id: actor.user_id.clone(),
        role: actor.role,
        event,
        kind,
        reason,
    };

    let role_grants: Vec<&Grant> = grants(kind, event)
        .iter()
        .filter(|g| g.role == actor.role)
        .collect();

    if role_grants.is_empty() {
        return Err(denied(format!("role {} is not permitted", actor.role)));
    }

    if role_grants.iter().any(|g| in_scope(actor, g.scope, transfer)) {
        return Ok(());
    }

    let side = match role_grants[0].scope {
        Scope::Destination => &transfer.destination,
        _ => &transfer.origin,
    };
    Err(denied(format!("{} is outside the user's organization", side)))
}

/// Events the actor may invoke on a transfer right now, ignoring status.
pub fn permitted_events(actor: &Actor, transfer: &Transfer) -> Vec<TransferEvent> {
    TransferEvent::ALL
        .into_iter()
        .filter(|event| authorize(actor, transfer.kind, *event, transfer).is_ok())
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrgRef, TransferStatus};
    use chrono::Utc;

    fn transfer(kind: TransferKind, origin: OrgRef, destination: OrgRef) -> Transfer {
        let now = Utc::now();
        Transfer {
            id: "t-1".to_string(),
            kind,
            status: TransferStatus::Draft,
            origin,
            destination,
            reference_number: "REF".to_string(),
            expected_arrival_date: None,
            actual_arrival_date: None,
            created_by: "u-0".to_string(),
            dispatched_by: None,
            received_by: None,
            validated_by: None,
            dispatched_at: None,
            received_at: None,
            validated_at: None,
            notes: None,
            discrepancy_notes: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    fn distribution_to(school: &str) -> Transfer {
        transfer(
            TransferKind::Distribution,
            OrgRef::council("council-1"),
            OrgRef::school(school),
        )
    }

    #[test]
    fn test_school_rep_confirms_only_own_school() {
        let rep = Actor::new("u-1", Role::SchoolRepresentative).with_school("school-a");

        let own = distribution_to("school-a");
        assert!(authorize(&rep, own.kind, TransferEvent::Receive, &own).is_ok());

        let other = distribution_to("school-b");
        let err = authorize(&rep, other.kind, TransferEvent::Receive, &other).unwrap_err();
        match err {
            CoreError::Authorization { reason, .. } => assert!(reason.contains("SCHOOL:school-b")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_school_rep_cannot_dispatch() {
        let rep = Actor::new("u-1", Role::SchoolRepresentative).with_school("school-a");
        let t = distribution_to("school-a");
        let err = authorize(&rep, t.kind, TransferEvent::Dispatch, &t).unwrap_err();
        assert!(matches!(err, CoreError::Authorization { reason, .. } if reason.contains("not permitted")));
    }

    #[test]
    fn test_warehouse_manager_scoped_to_origin() {
        let t = transfer(
            TransferKind::DirectShipment,
            OrgRef::warehouse("wh-1"),
            OrgRef::school("school-a"),
        );
        let own = Actor::new("u-2", Role::WarehouseManager).with_warehouse("wh-1");
        let other = Actor::new("u-3", Role::WarehouseManager).with_warehouse("wh-2");

        assert!(authorize(&own, t.kind, TransferEvent::Dispatch, &t).is_ok());
        assert!(authorize(&other, t.kind, TransferEvent::Dispatch, &t).is_err());
    }

    #[test]
    fn test_council_officer_receives_own_council_shipments() {
        let t = transfer(
            TransferKind::CouncilShipment,
            OrgRef::warehouse("wh-1"),
            OrgRef::council("council-1"),
        );
        let officer = Actor::new("u-4", Role::CouncilOfficer).with_council("council-1");
        let stranger = Actor::new("u-5", Role::CouncilOfficer).with_council("council-9");

        assert!(authorize(&officer, t.kind, TransferEvent::Receive, &t).is_ok());
        assert!(authorize(&stranger, t.kind, TransferEvent::Receive, &t).is_err());
        assert!(authorize(&officer, t.kind, TransferEvent::Dispatch, &t).is_err());
    }

    #[test]
    fn test_supplier_receipt_split_between_roles() {
        let t = transfer(
            TransferKind::SupplierReceipt,
            OrgRef::supplier("sup-1"),
            OrgRef::warehouse("wh-1"),
        );
        let clerk = Actor::new("u-6", Role::WarehouseManager).with_warehouse("wh-1");
        let national = Actor::new("u-7", Role::NationalManager);

        assert!(authorize(&clerk, t.kind, TransferEvent::Receive, &t).is_ok());
        assert!(authorize(&clerk, t.kind, TransferEvent::Validate, &t).is_err());
        assert!(authorize(&national, t.kind, TransferEvent::Validate, &t).is_ok());
        assert!(authorize(&national, t.kind, TransferEvent::Receive, &t).is_err());
    }

    #[test]
    fn test_super_admin_bypasses_and_view_only_is_denied_everything() {
        let t = distribution_to("school-a");
        let admin = Actor::new("root", Role::SuperAdmin);
        let viewer = Actor::new("eyes", Role::ViewOnly)
            .with_school("school-a")
            .with_council("council-1");

        for event in TransferEvent::ALL {
            assert!(authorize(&admin, t.kind, event, &t).is_ok());
            assert!(authorize(&viewer, t.kind, event, &t).is_err());
        }
        assert!(permitted_events(&viewer, &t).is_empty());
    }

    #[test]
    fn test_view_only_never_granted() {
        for kind in TransferKind::ALL {
            for event in TransferEvent::ALL {
                assert!(grants(kind, event).iter().all(|g| g.role != Role::ViewOnly));
            }
        }
    }
}
