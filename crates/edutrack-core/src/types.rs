//! # Domain Types
//!
//! Core domain types shared by every kind of hand-off.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────┐   │
//! │  │    Transfer     │   │  TransferLineItem   │   │     Actor       │   │
//! │  │  ─────────────  │   │  ─────────────────  │   │  ─────────────  │   │
//! │  │  id (UUID)      │1 *│  item_id            │   │  user_id        │   │
//! │  │  kind           │──►│  quantity_expected  │   │  role           │   │
//! │  │  status         │   │  quantity_received  │   │  warehouse_id?  │   │
//! │  │  origin/dest    │   │  quantity_damaged   │   │  council_id?    │   │
//! │  │  version        │   │  condition          │   │  school_id?     │   │
//! │  └─────────────────┘   └─────────────────────┘   └─────────────────┘   │
//! │                                                                         │
//! │  TransferKind          TransferStatus         OrgType                  │
//! │  SUPPLIER_RECEIPT      DRAFT … CANCELLED      SUPPLIER / WAREHOUSE /   │
//! │  DIRECT_SHIPMENT       (one set for every     COUNCIL / SCHOOL         │
//! │  COUNCIL_SHIPMENT       kind; labels vary)                             │
//! │  DISTRIBUTION                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every transfer has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - `reference_number`: human-readable, unique within its kind

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Transfer Kind
// =============================================================================

/// The kind of physical hand-off a transfer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum TransferKind {
    /// Supplier delivers stock into a national warehouse.
    SupplierReceipt,
    /// Warehouse ships straight to a school.
    DirectShipment,
    /// Warehouse ships to a local council.
    CouncilShipment,
    /// Council hands materials on to a school.
    Distribution,
}

impl TransferKind {
    pub const ALL: [TransferKind; 4] = [
        TransferKind::SupplierReceipt,
        TransferKind::DirectShipment,
        TransferKind::CouncilShipment,
        TransferKind::Distribution,
    ];

    /// Organization type the materials leave from.
    pub const fn origin_type(self) -> OrgType {
        match self {
            TransferKind::SupplierReceipt => OrgType::Supplier,
            TransferKind::DirectShipment | TransferKind::CouncilShipment => OrgType::Warehouse,
            TransferKind::Distribution => OrgType::Council,
        }
    }

    /// Organization type that takes custody on receipt.
    pub const fn destination_type(self) -> OrgType {
        match self {
            TransferKind::SupplierReceipt => OrgType::Warehouse,
            TransferKind::DirectShipment | TransferKind::Distribution => OrgType::School,
            TransferKind::CouncilShipment => OrgType::Council,
        }
    }

    /// Prefix used for generated reference numbers.
    pub const fn reference_prefix(self) -> &'static str {
        match self {
            TransferKind::SupplierReceipt => "SR",
            TransferKind::DirectShipment => "DS",
            TransferKind::CouncilShipment => "CS",
            TransferKind::Distribution => "DB",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TransferKind::SupplierReceipt => "SUPPLIER_RECEIPT",
            TransferKind::DirectShipment => "DIRECT_SHIPMENT",
            TransferKind::CouncilShipment => "COUNCIL_SHIPMENT",
            TransferKind::Distribution => "DISTRIBUTION",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransferKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "kind".to_string(),
                reason: format!("unknown transfer kind '{}'", s),
            })
    }
}

// =============================================================================
// Transfer Status
// =============================================================================

/// The status of a transfer.
///
/// One status set serves every kind; which statuses a kind can actually
/// reach is decided by the transition table in [`crate::state_machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum TransferStatus {
    /// Created, not yet dispatched. Line items may still be revised.
    Draft,
    Dispatched,
    InTransit,
    Delivered,
    /// Quantities recorded, awaiting a validator's decision.
    Received,
    /// Receipt reconciled cleanly.
    Confirmed,
    /// Reconciled cleanly by a validator.
    Validated,
    /// Reconciliation disagreed; discrepancy notes are on file.
    Discrepancy,
    Cancelled,
}

impl Default for TransferStatus {
    fn default() -> Self {
        TransferStatus::Draft
    }
}

impl TransferStatus {
    pub const ALL: [TransferStatus; 9] = [
        TransferStatus::Draft,
        TransferStatus::Dispatched,
        TransferStatus::InTransit,
        TransferStatus::Delivered,
        TransferStatus::Received,
        TransferStatus::Confirmed,
        TransferStatus::Validated,
        TransferStatus::Discrepancy,
        TransferStatus::Cancelled,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Draft => "DRAFT",
            TransferStatus::Dispatched => "DISPATCHED",
            TransferStatus::InTransit => "IN_TRANSIT",
            TransferStatus::Delivered => "DELIVERED",
            TransferStatus::Received => "RECEIVED",
            TransferStatus::Confirmed => "CONFIRMED",
            TransferStatus::Validated => "VALIDATED",
            TransferStatus::Discrepancy => "DISCREPANCY",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }

    /// Name shown to users of a given workflow.
    ///
    /// The statuses are shared; each workflow historically used its own
    /// words for a few of them.
    pub const fn label(self, kind: TransferKind) -> &'static str {
        match (kind, self) {
            (TransferKind::SupplierReceipt, TransferStatus::Draft) => "PENDING",
            (TransferKind::CouncilShipment, TransferStatus::Dispatched) => "SHIPPED",
            (TransferKind::DirectShipment | TransferKind::Distribution, TransferStatus::Draft) => {
                "CREATED"
            }
            _ => self.as_str(),
        }
    }

    /// No further events can change this status.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Confirmed | TransferStatus::Validated | TransferStatus::Cancelled
        )
    }

    /// Goods are in the recipient's hands but the books are not closed yet.
    pub const fn is_awaiting_reconciliation(self) -> bool {
        matches!(
            self,
            TransferStatus::Delivered | TransferStatus::Received | TransferStatus::Discrepancy
        )
    }

    /// Statuses in which recorded mismatches must carry discrepancy notes.
    pub const fn is_discrepancy_bearing(self) -> bool {
        matches!(self, TransferStatus::Received | TransferStatus::Discrepancy)
    }

    /// Still before dispatch, i.e. cancellable and revisable.
    pub const fn is_pre_dispatch(self) -> bool {
        matches!(self, TransferStatus::Draft)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransferStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "status".to_string(),
                reason: format!("unknown transfer status '{}'", s),
            })
    }
}

// =============================================================================
// Organizations
// =============================================================================

/// Type of custodian at either end of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum OrgType {
    Supplier,
    Warehouse,
    Council,
    School,
}

impl OrgType {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrgType::Supplier => "SUPPLIER",
            OrgType::Warehouse => "WAREHOUSE",
            OrgType::Council => "COUNCIL",
            OrgType::School => "SCHOOL",
        }
    }
}

impl fmt::Display for OrgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a supplier, warehouse, council or school.
///
/// The reference data itself lives outside the engine; only the typed id is
/// stored on the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OrgRef {
    pub org_type: OrgType,
    pub id: String,
}

impl OrgRef {
    pub fn new(org_type: OrgType, id: impl Into<String>) -> Self {
        OrgRef {
            org_type,
            id: id.into(),
        }
    }

    pub fn supplier(id: impl Into<String>) -> Self {
        OrgRef::new(OrgType::Supplier, id)
    }

    pub fn warehouse(id: impl Into<String>) -> Self {
        OrgRef::new(OrgType::Warehouse, id)
    }

    pub fn council(id: impl Into<String>) -> Self {
        OrgRef::new(OrgType::Council, id)
    }

    pub fn school(id: impl Into<String>) -> Self {
        OrgRef::new(OrgType::School, id)
    }
}

impl fmt::Display for OrgRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.org_type, self.id)
    }
}

// =============================================================================
// Item Condition
// =============================================================================

/// Condition of a line item as observed on receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ItemCondition {
    New,
    Good,
    Fair,
    Damaged,
}

// =============================================================================
// Roles & Actors
// =============================================================================

/// Role of the calling user, as supplied by the external auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    SuperAdmin,
    NationalManager,
    WarehouseManager,
    CouncilOfficer,
    SchoolRepresentative,
    ViewOnly,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::NationalManager => "national_manager",
            Role::WarehouseManager => "warehouse_manager",
            Role::CouncilOfficer => "council_officer",
            Role::SchoolRepresentative => "school_representative",
            Role::ViewOnly => "view_only",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity performing an operation.
///
/// Trusted as given: the engine never derives or verifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    pub warehouse_id: Option<String>,
    pub council_id: Option<String>,
    pub school_id: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Actor {
            user_id: user_id.into(),
            role,
            warehouse_id: None,
            council_id: None,
            school_id: None,
        }
    }

    pub fn with_warehouse(mut self, id: impl Into<String>) -> Self {
        self.warehouse_id = Some(id.into());
        self
    }

    pub fn with_council(mut self, id: impl Into<String>) -> Self {
        self.council_id = Some(id.into());
        self
    }

    pub fn with_school(mut self, id: impl Into<String>) -> Self {
        self.school_id = Some(id.into());
        self
    }

    /// The actor's own organization of the given type, if any.
    pub fn org_id(&self, org_type: OrgType) -> Option<&str> {
        match org_type {
            OrgType::Warehouse => self.warehouse_id.as_deref(),
            OrgType::Council => self.council_id.as_deref(),
            OrgType::School => self.school_id.as_deref(),
            OrgType::Supplier => None,
        }
    }

    /// Whether the actor belongs to the referenced organization.
    pub fn belongs_to(&self, org: &OrgRef) -> bool {
        self.org_id(org.org_type) == Some(org.id.as_str())
    }
}

// =============================================================================
// Transfer
// =============================================================================

/// One physical hand-off of materials between two custodians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Transfer {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub origin: OrgRef,
    pub destination: OrgRef,

    /// Human-facing identifier, unique within `kind`.
    pub reference_number: String,

    #[ts(as = "Option<String>")]
    pub expected_arrival_date: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub actual_arrival_date: Option<NaiveDate>,

    pub created_by: String,
    pub dispatched_by: Option<String>,
    pub received_by: Option<String>,
    pub validated_by: Option<String>,

    #[ts(as = "Option<String>")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub validated_at: Option<DateTime<Utc>>,

    pub notes: Option<String>,
    /// Required whenever a line item disagrees in a discrepancy-bearing status.
    pub discrepancy_notes: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Optimistic-concurrency token, bumped on every persisted change.
    pub version: i64,
}

impl Transfer {
    /// Whether discrepancy notes are on file.
    pub fn has_discrepancy_notes(&self) -> bool {
        self.discrepancy_notes
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false)
    }
}

// =============================================================================
// Transfer Line Item
// =============================================================================

/// One material line within a transfer.
///
/// Uses the snapshot pattern: catalog code, name and unit are frozen at
/// creation so later catalog edits don't rewrite a transfer's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TransferLineItem {
    pub id: String,
    pub transfer_id: String,
    pub item_id: String,
    /// Catalog code at time of creation (frozen).
    pub item_code: String,
    /// Catalog name at time of creation (frozen).
    pub item_name: String,
    pub unit_of_measure: String,

    /// Fixed once the transfer is dispatched.
    pub quantity_expected: i64,
    /// `None` until the line has been received.
    pub quantity_received: Option<i64>,
    pub quantity_damaged: Option<i64>,
    pub condition_on_receipt: Option<ItemCondition>,

    pub batch_number: Option<String>,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl TransferLineItem {
    /// `expected - (received + damaged)`, once the line has been received.
    pub fn discrepancy_quantity(&self) -> Option<i64> {
        self.quantity_received.map(|received| {
            self.quantity_expected - received - self.quantity_damaged.unwrap_or(0)
        })
    }

    /// Whether the recorded quantities disagree with expectations.
    pub fn has_discrepancy(&self) -> bool {
        matches!(self.discrepancy_quantity(), Some(q) if q != 0)
    }

    pub fn is_received(&self) -> bool {
        self.quantity_received.is_some()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// A transfer together with its line items, as returned by every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TransferSnapshot {
    pub transfer: Transfer,
    pub line_items: Vec<TransferLineItem>,
}

impl TransferSnapshot {
    pub fn line_item(&self, id: &str) -> Option<&TransferLineItem> {
        self.line_items.iter().find(|item| item.id == id)
    }

    /// Any line whose recorded quantities disagree with expectations.
    pub fn has_discrepancy(&self) -> bool {
        self.line_items.iter().any(TransferLineItem::has_discrepancy)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(expected: i64, received: Option<i64>, damaged: Option<i64>) -> TransferLineItem {
        let now = Utc::now();
        TransferLineItem {
            id: "li-1".to_string(),
            transfer_id: "t-1".to_string(),
            item_id: "item-1".to_string(),
            item_code: "MATH-G4".to_string(),
            item_name: "Mathematics Grade 4".to_string(),
            unit_of_measure: "book".to_string(),
            quantity_expected: expected,
            quantity_received: received,
            quantity_damaged: damaged,
            condition_on_receipt: None,
            batch_number: None,
            expiry_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_discrepancy_quantity_is_derived() {
        assert_eq!(line(100, None, None).discrepancy_quantity(), None);
        assert_eq!(line(100, Some(90), Some(5)).discrepancy_quantity(), Some(5));
        assert_eq!(line(100, Some(95), Some(5)).discrepancy_quantity(), Some(0));
        assert!(line(100, Some(90), Some(5)).has_discrepancy());
        assert!(!line(100, Some(100), None).has_discrepancy());
        assert!(!line(100, None, None).has_discrepancy());
    }

    #[test]
    fn test_kind_endpoints() {
        assert_eq!(TransferKind::SupplierReceipt.origin_type(), OrgType::Supplier);
        assert_eq!(TransferKind::SupplierReceipt.destination_type(), OrgType::Warehouse);
        assert_eq!(TransferKind::CouncilShipment.destination_type(), OrgType::Council);
        assert_eq!(TransferKind::Distribution.origin_type(), OrgType::Council);
        assert_eq!(TransferKind::Distribution.destination_type(), OrgType::School);
    }

    #[test]
    fn test_status_labels_alias_per_kind() {
        assert_eq!(TransferStatus::Draft.label(TransferKind::SupplierReceipt), "PENDING");
        assert_eq!(TransferStatus::Draft.label(TransferKind::DirectShipment), "CREATED");
        assert_eq!(TransferStatus::Dispatched.label(TransferKind::CouncilShipment), "SHIPPED");
        assert_eq!(TransferStatus::Confirmed.label(TransferKind::Distribution), "CONFIRMED");
    }

    #[test]
    fn test_kind_and_status_parse() {
        assert_eq!(
            "direct_shipment".parse::<TransferKind>().unwrap(),
            TransferKind::DirectShipment
        );
        assert_eq!(
            "IN_TRANSIT".parse::<TransferStatus>().unwrap(),
            TransferStatus::InTransit
        );
        assert!("LOST".parse::<TransferStatus>().is_err());
    }

    #[test]
    fn test_actor_scope() {
        let actor = Actor::new("u-1", Role::SchoolRepresentative).with_school("school-a");
        assert!(actor.belongs_to(&OrgRef::school("school-a")));
        assert!(!actor.belongs_to(&OrgRef::school("school-b")));
        assert!(!actor.belongs_to(&OrgRef::warehouse("school-a")));
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let json = serde_json::to_string(&TransferStatus::InTransit).unwrap();
        assert_eq!(json, "\"IN_TRANSIT\"");
        let json = serde_json::to_string(&Role::ViewOnly).unwrap();
        assert_eq!(json, "\"view_only\"");
    }
}
