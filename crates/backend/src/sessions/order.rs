//! Order-list algebra, kept free of I/O.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, specta::Type, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderOperation {
    /// Append ids not yet listed. Each must have a record.
    Create,
    /// Remove ids and close the gap
    Delete,
    /// Replace the sequence with a permutation of the existing sessions
    Reorder,
}

/// Apply `operation` to `order`. `existing` holds every id with a record.
pub fn apply(
    order: &[String],
    ids: &[String],
    operation: OrderOperation,
    existing: &HashSet<String>,
) -> Result<Vec<String>, SessionError> {
    let unknown = |ids: &[String]| -> Vec<String> {
        ids.iter()
            .filter(|id| !existing.contains(*id))
            .cloned()
            .collect()
    };

    match operation {
        OrderOperation::Create => {
            let missing = unknown(ids);
            if !missing.is_empty() {
                return Err(SessionError::UnknownIds(missing));
            }

            let mut next = order.to_vec();
            for id in ids {
                if !next.contains(id) {
                    next.push(id.clone());
                }
            }
            Ok(next)
        }

        OrderOperation::Delete => Ok(order
            .iter()
            .filter(|id| !ids.contains(*id))
            .cloned()
            .collect()),

        OrderOperation::Reorder => {
            let missing = unknown(ids);
            if !missing.is_empty() {
                return Err(SessionError::UnknownIds(missing));
            }

            let distinct: HashSet<&String> = ids.iter().collect();
            if distinct.len() != ids.len() || distinct.len() != existing.len() {
                return Err(SessionError::NotAPermutation);
            }
            Ok(ids.to_vec())
        }
    }
}

/// Repair drift between the order list and the records on disk.
///
/// Listed ids without a record are dropped along with duplicates. Records
/// missing from the list are appended oldest first.
pub fn heal(order: &[String], records: &[(String, DateTime<Utc>)]) -> Vec<String> {
    let existing: HashSet<&str> = records.iter().map(|(id, _)| id.as_str()).collect();
    let mut seen = HashSet::new();

    let mut healed = Vec::with_capacity(records.len());
    for id in order {
        if existing.contains(id.as_str()) && seen.insert(id.as_str()) {
            healed.push(id.clone());
        }
    }

    let mut orphans: Vec<&(String, DateTime<Utc>)> = records
        .iter()
        .filter(|(id, _)| !seen.contains(id.as_str()))
        .collect();
    orphans.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    healed.extend(orphans.into_iter().map(|(id, _)| id.clone()));

    healed
}
