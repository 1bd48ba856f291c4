//! Retention sweeper - bounds how long posted content is kept

use std::sync::Arc;

use tracing::debug;

use crate::storage::{ContentStore, RetentionPolicy, StorageResult};
use crate::types::ContentKind;

/// Rows removed by one prune pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub texts: usize,
    pub images: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.texts + self.images
    }
}

/// Deletes aged content from both collections
#[derive(Clone)]
pub struct RetentionSweeper {
    store: Arc<ContentStore>,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(store: Arc<ContentStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    /// Sweep every aged record of both kinds, regardless of what triggered it
    pub fn prune(&self) -> StorageResult<SweepReport> {
        let mut report = SweepReport::default();

        for kind in ContentKind::ALL {
            let removed = self.store.sweep(kind, self.policy.max_age)?;
            match kind {
                ContentKind::Text => report.texts = removed,
                ContentKind::Image => report.images = removed,
            }
        }

        if report.total() > 0 {
            debug!(
                "Pruned {} text and {} image message(s) older than {}s",
                report.texts,
                report.images,
                self.policy.max_age.num_seconds()
            );
        }
        Ok(report)
    }
}
