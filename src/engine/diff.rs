//! Snapshot diff.
//!
//! Decides which records of a freshly fetched payload were not present in
//! the previous snapshot. Comparison is exact structural equality over
//! whole records; there is no keying or hashing, so the membership test is
//! a linear scan of the snapshot for every new record.

use tracing::info;

use crate::types::{Payload, Record};

/// Result of comparing a payload against the stored snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffOutcome {
    /// Records absent from the snapshot, in payload order. Duplicates in
    /// the payload are kept, one entry per occurrence.
    pub new_records: Payload,
    /// The payload equalled the snapshot and no record was compared.
    pub fast_path: bool,
    /// Record-to-record equality checks performed.
    pub comparisons: usize,
}

impl DiffOutcome {
    pub fn is_empty(&self) -> bool {
        self.new_records.is_empty()
    }
}

/// Compare `payload` with `snapshot`.
///
/// With `debug` set, every record and comparison result is logged.
pub fn diff(payload: &[Record], snapshot: Option<&[Record]>, debug: bool) -> DiffOutcome {
    if snapshot == Some(payload) {
        if debug {
            info!("nothing to compare");
        }
        return DiffOutcome {
            new_records: Vec::new(),
            fast_path: true,
            comparisons: 0,
        };
    }

    let previous = snapshot.unwrap_or(&[]);
    let mut new_records = Vec::new();
    let mut comparisons = 0;

    for record in payload {
        if debug {
            info!(record = %serde_json::Value::Object(record.clone()), "record");
        }

        let mut found = false;
        for seen in previous {
            comparisons += 1;
            if record == seen {
                found = true;
                break;
            }
        }

        if debug {
            info!(found, "found is {found}!");
        }
        if !found {
            new_records.push(record.clone());
        }
    }

    DiffOutcome {
        new_records,
        fast_path: false,
        comparisons,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
