// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Application of a whole manifest.

use {
    crate::{
        executor::{execute, ExecutionContext, ExecutionOutcome, OperationStatus},
        manifest::Manifest,
    },
    log::{error, info, warn},
};

/// Ordered outcomes of applying a manifest.
///
/// Outcome `i` corresponds to operation `i` of the manifest.
#[derive(Debug, Default)]
pub struct ModificationReport {
    outcomes: Vec<ExecutionOutcome>,
}

impl ModificationReport {
    pub fn outcomes(&self) -> &[ExecutionOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<ExecutionOutcome> {
        self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of operations that failed.
    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.status.is_success())
            .count()
    }

    /// Whether every operation succeeded.
    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    /// Log one line per operation followed by a total.
    pub fn log_summary(&self) {
        for (i, outcome) in self.outcomes.iter().enumerate() {
            match &outcome.status {
                OperationStatus::Success => info!("  [{}] ok: {}", i + 1, outcome.operation),
                OperationStatus::Failed(err) => {
                    error!("  [{}] FAILED: {}: {}", i + 1, outcome.operation, err)
                }
            }
        }

        let failures = self.failure_count();
        if failures == 0 {
            warn!("applied {} modification(s)", self.outcomes.len());
        } else {
            warn!(
                "applied {} of {} modification(s); {} failed",
                self.outcomes.len() - failures,
                self.outcomes.len(),
                failures
            );
        }
    }
}

/// Apply every operation of a manifest in document order.
///
/// Each operation is attempted regardless of the outcome of earlier ones.
pub fn apply(manifest: &Manifest, context: &ExecutionContext) -> ModificationReport {
    let total = manifest.len();

    let outcomes = manifest
        .operations()
        .iter()
        .enumerate()
        .map(|(i, operation)| {
            info!("[{}/{}] {}", i + 1, total, operation);

            let status = execute(operation, context);
            if let OperationStatus::Failed(err) = &status {
                error!("[{}/{}] failed: {}", i + 1, total, err);
            }

            ExecutionOutcome {
                operation: operation.clone(),
                status,
            }
        })
        .collect();

    ModificationReport { outcomes }
}
