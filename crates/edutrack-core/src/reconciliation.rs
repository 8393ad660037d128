//! # Quantity Reconciliation
//!
//! Decides, from submitted line-item quantities, whether a transfer is clean
//! or in discrepancy.
//!
//! ## Algorithm
//! ```text
//! for each line:
//!   any quantity < 0 or > MAX_QUANTITY  → ValidationError
//!   received + damaged > expected       → ValidationError (Reject policy)
//!                                         or excess discrepancy (Accept policy)
//!   discrepancy = expected - received - damaged
//!   line has discrepancy = discrepancy != 0
//!                          || (damaged > 0 && damage is flagged)
//!
//! transfer has discrepancy = any(line has discrepancy)
//! discrepancy without notes              → DiscrepancyRequiresNotes
//! target = discrepancy ? discrepancy target : clean target
//! ```
//!
//! Damage is flagged on receipt. A validator approving a receipt has
//! reviewed the recorded damage, so under [`DamageHandling::Accept`] damaged
//! units that account for the rest of the expected quantity are not a
//! discrepancy by themselves.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::request::LineItemResult;
use crate::types::{TransferLineItem, TransferStatus};
use crate::MAX_QUANTITY;

// =============================================================================
// Policy
// =============================================================================

/// What to do when received + damaged exceeds the expected quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverDeliveryPolicy {
    /// Refuse the submission.
    #[default]
    Reject,
    /// Record it and treat the excess as a discrepancy.
    Accept,
}

impl std::str::FromStr for OverDeliveryPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(OverDeliveryPolicy::Reject),
            "accept" => Ok(OverDeliveryPolicy::Accept),
            other => Err(ValidationError::InvalidFormat {
                field: "over_delivery".to_string(),
                reason: format!("unknown policy '{}', expected reject or accept", other),
            }),
        }
    }
}

/// Whether damaged units alone make a line discrepant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageHandling {
    Flag,
    Accept,
}

/// Knobs for one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub over_delivery: OverDeliveryPolicy,
    pub damage: DamageHandling,
}

impl ReconcilePolicy {
    /// Policy used when goods are received.
    pub fn on_receipt(over_delivery: OverDeliveryPolicy) -> Self {
        ReconcilePolicy {
            over_delivery,
            damage: DamageHandling::Flag,
        }
    }

    /// Policy used when a validator approves.
    pub fn on_approval(over_delivery: OverDeliveryPolicy) -> Self {
        ReconcilePolicy {
            over_delivery,
            damage: DamageHandling::Accept,
        }
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Quantities for one line, ready to be scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineQuantities {
    pub line_item_id: String,
    pub expected: i64,
    pub received: i64,
    pub damaged: i64,
}

/// Whether a submission must cover every line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Every line needs a result (receive).
    All,
    /// Missing lines fall back to their recorded quantities (validate).
    Corrections,
}

/// Pairs submitted results with the transfer's lines.
///
/// ## Errors
/// - `DuplicateLineItem` when a line is submitted twice
/// - `UnknownLineItem` when a result names a line not on the transfer
/// - `MissingLineItem` when a line has neither a result nor recorded quantities
pub fn collect_quantities(
    transfer_id: &str,
    line_items: &[TransferLineItem],
    results: &[LineItemResult],
    coverage: Coverage,
) -> Result<Vec<LineQuantities>, ValidationError> {
    let known: HashSet<&str> = line_items.iter().map(|l| l.id.as_str()).collect();
    let mut submitted: HashMap<&str, &LineItemResult> = HashMap::with_capacity(results.len());

    for result in results {
        if !known.contains(result.line_item_id.as_str()) {
            return Err(ValidationError::UnknownLineItem {
                line_item_id: result.line_item_id.clone(),
                transfer_id: transfer_id.to_string(),
            });
        }
        if submitted.insert(result.line_item_id.as_str(), result).is_some() {
            return Err(ValidationError::DuplicateLineItem {
                line_item_id: result.line_item_id.clone(),
            });
        }
    }

    line_items
        .iter()
        .map(|line| {
            let (received, damaged) = match (submitted.get(line.id.as_str()), coverage) {
                (Some(result), _) => (result.quantity_received, result.quantity_damaged),
                (None, Coverage::Corrections) => match line.quantity_received {
                    Some(received) => (received, line.quantity_damaged.unwrap_or(0)),
                    None => {
                        return Err(ValidationError::MissingLineItem {
                            line_item_id: line.id.clone(),
                        })
                    }
                },
                (None, Coverage::All) => {
                    return Err(ValidationError::MissingLineItem {
                        line_item_id: line.id.clone(),
                    })
                }
            };
            Ok(LineQuantities {
                line_item_id: line.id.clone(),
                expected: line.quantity_expected,
                received,
                damaged,
            })
        })
        .collect()
}

// =============================================================================
// Scoring
// =============================================================================

/// Outcome for one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineReconciliation {
    pub line_item_id: String,
    pub quantity_expected: i64,
    pub quantity_received: i64,
    pub quantity_damaged: i64,
    /// `expected - received - damaged`; negative on accepted over-delivery.
    pub discrepancy_quantity: i64,
    /// Units that never arrived.
    pub shortage: i64,
    /// Units beyond what was expected.
    pub excess: i64,
    pub has_discrepancy: bool,
}

/// Outcome for the whole submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub lines: Vec<LineReconciliation>,
    pub has_discrepancy: bool,
}

impl ReconciliationReport {
    /// Ids of the lines that disagree.
    pub fn discrepant_line_ids(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|l| l.has_discrepancy)
            .map(|l| l.line_item_id.clone())
            .collect()
    }

    pub fn total_shortage(&self) -> i64 {
        self.lines.iter().map(|l| l.shortage).sum()
    }

    pub fn total_damaged(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity_damaged).sum()
    }

    pub fn total_excess(&self) -> i64 {
        self.lines.iter().map(|l| l.excess).sum()
    }
}

/// Scores one line.
pub fn reconcile_line(
    quantities: &LineQuantities,
    policy: ReconcilePolicy,
) -> Result<LineReconciliation, ValidationError> {
    let LineQuantities {
        line_item_id,
        expected,
        received,
        damaged,
    } = quantities;

    for (field, value) in [
        ("quantityExpected", *expected),
        ("quantityReceived", *received),
        ("quantityDamaged", *damaged),
    ] {
        if value < 0 {
            return Err(ValidationError::NegativeQuantity {
                field: field.to_string(),
                line_item_id: line_item_id.clone(),
            });
        }
        if value > MAX_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                min: 0,
                max: MAX_QUANTITY,
            });
        }
    }

    // Bounded by MAX_QUANTITY, so neither the sum nor the difference overflows.
    let accounted = received + damaged;
    if accounted > *expected && policy.over_delivery == OverDeliveryPolicy::Reject {
        return Err(ValidationError::ExceedsExpected {
            line_item_id: line_item_id.clone(),
            expected: *expected,
            received: *received,
            damaged: *damaged,
        });
    }

    let discrepancy_quantity = expected - accounted;
    let damage_counts = *damaged > 0 && policy.damage == DamageHandling::Flag;

    Ok(LineReconciliation {
        line_item_id: line_item_id.clone(),
        quantity_expected: *expected,
        quantity_received: *received,
        quantity_damaged: *damaged,
        discrepancy_quantity,
        shortage: discrepancy_quantity.max(0),
        excess: (-discrepancy_quantity).max(0),
        has_discrepancy: discrepancy_quantity != 0 || damage_counts,
    })
}

/// Scores every line of a submission.
pub fn reconcile(
    lines: &[LineQuantities],
    policy: ReconcilePolicy,
) -> Result<ReconciliationReport, ValidationError> {
    let lines = lines
        .iter()
        .map(|line| reconcile_line(line, policy))
        .collect::<Result<Vec<_>, _>>()?;
    let has_discrepancy = lines.iter().any(|l| l.has_discrepancy);

    Ok(ReconciliationReport {
        lines,
        has_discrepancy,
    })
}

/// Picks the target status, demanding notes when the report disagrees.
///
/// `notes` are the discrepancy notes in effect: the ones submitted with the
/// call, or those already on the transfer.
pub fn route(
    transfer_id: &str,
    report: &ReconciliationReport,
    notes: Option<&str>,
    clean: TransferStatus,
    discrepancy: TransferStatus,
) -> CoreResult<TransferStatus> {
    if !report.has_discrepancy {
        return Ok(clean);
    }

    let has_notes = notes.map(|n| !n.trim().is_empty()).unwrap_or(false);
    if !has_notes {
        return Err(CoreError::DiscrepancyRequiresNotes {
            transfer_id: transfer_id.to_string(),
            line_item_ids: report.discrepant_line_ids(),
        });
    }

    Ok(discrepancy)
}

// =============================================================================
// Unit Tests
// =============================================================================
