//! Recall resolver - maps a recalled message id back to its stored content

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::storage::{ContentRecord, ContentStore, RetentionPolicy, StorageResult};
use crate::sweeper::RetentionSweeper;
use crate::types::{ContentKind, RecallOutcome};

/// Looks up recalled content and prunes the store afterwards
///
/// Pruning piggybacks on recalls, so growth is bounded only while recalls
/// keep arriving. Without them the startup wipe is the only bound.
pub struct RecallResolver {
    store: Arc<ContentStore>,
    sweeper: RetentionSweeper,
}

impl RecallResolver {
    pub fn new(store: Arc<ContentStore>, policy: RetentionPolicy) -> Self {
        let sweeper = RetentionSweeper::new(store.clone(), policy);
        Self { store, sweeper }
    }

    /// Resolve a recalled message id
    ///
    /// Text is checked before images; a hit in either is final. Both
    /// collections are swept after the lookup whatever its result.
    pub fn resolve(&self, id: &str) -> StorageResult<RecallOutcome> {
        let outcome = self.lookup(id);

        match self.sweeper.prune() {
            Ok(report) => debug!("Post-recall sweep removed {} row(s)", report.total()),
            Err(e) => warn!("Post-recall sweep failed: {}", e),
        }

        outcome
    }

    fn lookup(&self, id: &str) -> StorageResult<RecallOutcome> {
        for kind in ContentKind::ALL {
            if let Some((sender, content)) =
                self.store.get(kind, id)?.map(ContentRecord::into_parts)
            {
                info!("{} recalled {} message {}", sender, kind, id);
                return Ok(RecallOutcome::found(sender, content));
            }
        }

        info!("Recalled message {} is not in the store", id);
        Ok(RecallOutcome::NotFound)
    }
}
