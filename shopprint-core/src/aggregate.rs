//! Flatten raw orders into one entry per product identifier.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::contract::{RawLineItem, RawOrder};

/// A validated line item: identifier and label present, quantity positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub identifier: String,
    pub variant_label: String,
    pub quantity: u64,
}

impl LineItem {
    /// `None` for line items that cannot be tracked (missing or empty fields, quantity ≤ 0).
    pub fn from_raw(raw: &RawLineItem) -> Option<Self> {
        let identifier = raw.sku.as_deref().filter(|s| !s.is_empty())?;
        let variant_label = raw.variant_title.as_deref().filter(|s| !s.is_empty())?;
        let quantity = raw.quantity.filter(|q| *q > 0)?;
        Some(Self {
            identifier: identifier.to_string(),
            variant_label: variant_label.to_string(),
            quantity: quantity as u64,
        })
    }
}

/// One identifier's combined quantity across every fetched order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedItem {
    pub identifier: String,
    pub variant_label: String,
    pub quantity: u64,
}

/// What to do when the same identifier arrives with a different variant label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
    /// The most recent label overwrites the stored one.
    #[default]
    LastSeen,
    /// The first label sticks.
    FirstSeen,
    /// Conflicting labels fail the aggregation.
    Reject,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("identifier {identifier} ordered as both '{first}' and '{second}'")]
    ConflictingLabel {
        identifier: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct OrderAggregator {
    policy: LabelPolicy,
}

impl OrderAggregator {
    pub fn new(policy: LabelPolicy) -> Self {
        Self { policy }
    }

    /// Sum quantities per identifier, keeping first-seen identifier order.
    ///
    /// Only [`LabelPolicy::Reject`] can make this fail.
    pub fn aggregate(&self, orders: &[RawOrder]) -> Result<Vec<AggregatedItem>, AggregateError> {
        let mut items: Vec<AggregatedItem> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut dropped = 0usize;

        for raw in orders.iter().flat_map(|o| o.line_items.iter()) {
            let Some(line) = LineItem::from_raw(raw) else {
                debug!(?raw, "Dropping untrackable line item");
                dropped += 1;
                continue;
            };

            match index.get(&line.identifier) {
                None => {
                    index.insert(line.identifier.clone(), items.len());
                    items.push(AggregatedItem {
                        identifier: line.identifier,
                        variant_label: line.variant_label,
                        quantity: line.quantity,
                    });
                }
                Some(&pos) => {
                    let entry = &mut items[pos];
                    // saturates instead of wrapping on absurd quantities
                    entry.quantity = entry.quantity.saturating_add(line.quantity);
                    if entry.variant_label != line.variant_label {
                        self.merge_label(entry, line.variant_label)?;
                    }
                }
            }
        }

        info!(
            items = items.len(),
            dropped_line_items = dropped,
            policy = ?self.policy,
            "Aggregated order line items"
        );
        Ok(items)
    }

    fn merge_label(
        &self,
        entry: &mut AggregatedItem,
        incoming: String,
    ) -> Result<(), AggregateError> {
        match self.policy {
            LabelPolicy::LastSeen => {
                warn!(
                    identifier = %entry.identifier,
                    previous = %entry.variant_label,
                    label = %incoming,
                    "Conflicting variant labels; keeping the last one"
                );
                entry.variant_label = incoming;
            }
            LabelPolicy::FirstSeen => {
                warn!(
                    identifier = %entry.identifier,
                    kept = %entry.variant_label,
                    ignored = %incoming,
                    "Conflicting variant labels; keeping the first one"
                );
            }
            LabelPolicy::Reject => {
                return Err(AggregateError::ConflictingLabel {
                    identifier: entry.identifier.clone(),
                    first: entry.variant_label.clone(),
                    second: incoming,
                });
            }
        }
        Ok(())
    }
}
