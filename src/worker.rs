//! Recall worker - the single consumer of classified events
//!
//! Every store and resolver call happens here, one event at a time, so the
//! check-then-insert in the store never races another writer. The optional
//! maintenance sweep is driven from the same loop, between events, so it can
//! never land in the middle of a recall lookup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::forwarder::{Delivery, NotificationForwarder};
use crate::resolver::RecallResolver;
use crate::storage::{ContentStore, RetentionPolicy, StorageError};
use crate::sweeper::RetentionSweeper;
use crate::types::{ContentKind, InboundEvent};

/// What became of one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Stored(ContentKind),
    /// Id already stored; the event is presumed recorded
    Duplicate(ContentKind),
    Republished(Delivery),
    /// Recall for content that was never tracked or already pruned
    Unresolved,
    Ignored,
    Failed,
}

pub struct RecallWorker {
    store: Arc<ContentStore>,
    resolver: RecallResolver,
    sweeper: RetentionSweeper,
    forwarder: NotificationForwarder,
    sweep_every: Option<Duration>,
}

impl RecallWorker {
    pub fn new(
        store: Arc<ContentStore>,
        policy: RetentionPolicy,
        forwarder: NotificationForwarder,
    ) -> Self {
        Self {
            resolver: RecallResolver::new(store.clone(), policy),
            sweeper: RetentionSweeper::new(store.clone(), policy),
            store,
            forwarder,
            sweep_every: None,
        }
    }

    /// Also prune on a fixed interval while idle
    ///
    /// Only needed when recalls are too rare to keep the store small on their own.
    pub fn with_sweep_interval(mut self, every: Option<Duration>) -> Self {
        self.sweep_every = every;
        self
    }

    /// Drain the queue until every sender is gone
    pub async fn run(self, mut events: mpsc::Receiver<InboundEvent>) {
        info!("🔁 Recall worker started");

        let mut ticker = self.sweep_every.map(|every| {
            info!("🧹 Periodic sweep every {}s", every.as_secs());
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                // Queued events go first; a due sweep waits for the current one
                biased;

                event = events.recv() => match event {
                    Some(event) => {
                        self.handle(event).await;
                    }
                    None => break,
                },
                _ = next_tick(&mut ticker) => self.sweep(),
            }
        }

        info!("Recall worker stopped");
    }

    fn sweep(&self) {
        match self.sweeper.prune() {
            Ok(report) => debug!("Periodic sweep removed {} row(s)", report.total()),
            Err(e) => warn!("Periodic sweep failed: {}", e),
        }
    }

    /// Process one event; failures stay contained to it
    pub async fn handle(&self, event: InboundEvent) -> Handled {
        match event {
            InboundEvent::TextPosted { id, body, sender } => {
                let result = self.store.put_text(&id, &body, &sender);
                stored(ContentKind::Text, &id, result)
            }
            InboundEvent::ImagePosted {
                id,
                payload,
                sender,
            } => {
                let result = self.store.put_image(&id, &payload, &sender);
                stored(ContentKind::Image, &id, result)
            }
            InboundEvent::ContentRecalled { id } => self.recall(&id).await,
            InboundEvent::Other => Handled::Ignored,
        }
    }

    async fn recall(&self, id: &str) -> Handled {
        let outcome = match self.resolver.resolve(id) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to resolve recalled message {}: {}", id, e);
                return Handled::Failed;
            }
        };

        let Some(notification) = outcome.into_notification() else {
            return Handled::Unresolved;
        };

        match self.forwarder.deliver(&notification).await {
            Ok(delivery) => Handled::Republished(delivery),
            Err(e) => {
                error!("Failed to republish recalled message {}: {:#}", id, e);
                Handled::Failed
            }
        }
    }
}

/// Wait for the next sweep tick; never completes when sweeping is off
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn stored(kind: ContentKind, id: &str, result: Result<(), StorageError>) -> Handled {
    match result {
        Ok(()) => {
            debug!("Stored {} message {}", kind, id);
            Handled::Stored(kind)
        }
        Err(StorageError::IdConflict { .. }) => {
            warn!("Skipping {} message {}: already stored", kind, id);
            Handled::Duplicate(kind)
        }
        Err(e) => {
            error!("Failed to store {} message {}: {}", kind, id, e);
            Handled::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::forwarder::tests::{RecordingSender, Sent};
    use crate::session::{DestinationStrategy, SessionContext};
    use chrono::{Duration, Utc};

    struct Harness {
        worker: RecallWorker,
        store: Arc<ContentStore>,
        clock: Arc<ManualClock>,
        sent: Arc<RecordingSender>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(ContentStore::in_memory_with_clock(clock.clone()).unwrap());
        let sent = Arc::new(RecordingSender::default());
        let session = Arc::new(SessionContext::new(DestinationStrategy::Static {
            group: "audit".to_string(),
        }));
        let forwarder = NotificationForwarder::new(sent.clone(), session);
        let worker = RecallWorker::new(store.clone(), RetentionPolicy::from_minutes(5), forwarder);

        Harness {
            worker,
            store,
            clock,
            sent,
        }
    }

    fn text(id: &str, body: &str, sender: &str) -> InboundEvent {
        InboundEvent::TextPosted {
            id: id.to_string(),
            body: body.to_string(),
            sender: sender.to_string(),
        }
    }

    fn recall(id: &str) -> InboundEvent {
        InboundEvent::ContentRecalled { id: id.to_string() }
    }

    #[tokio::test]
    async fn test_text_posted_then_recalled() {
        let h = harness();

        assert_eq!(
            h.worker.handle(text("1001", "hello", "Alice")).await,
            Handled::Stored(ContentKind::Text)
        );
        h.clock.advance(Duration::seconds(1));

        assert_eq!(
            h.worker.handle(recall("1001")).await,
            Handled::Republished(Delivery::Sent {
                destination: "audit".to_string()
            })
        );
        assert_eq!(
            *h.sent.sent.lock(),
            vec![Sent::Text("audit".to_string(), "Alice撤回了：hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_image_posted_then_recalled() {
        let h = harness();

        h.worker
            .handle(InboundEvent::ImagePosted {
                id: "2002".to_string(),
                payload: vec![1, 2, 3],
                sender: "Bob".to_string(),
            })
            .await;
        h.worker.handle(recall("2002")).await;

        let sent = h.sent.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1], Sent::Image("audit".to_string(), vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_duplicate_post_keeps_first_and_continues() {
        let h = harness();

        h.worker.handle(text("A", "x", "S")).await;
        assert_eq!(
            h.worker.handle(text("A", "y", "T")).await,
            Handled::Duplicate(ContentKind::Text)
        );

        let record = h.store.get_text("A").unwrap().unwrap();
        assert_eq!(record.body, "x");
        assert_eq!(record.sender, "S");

        // Later events are unaffected
        assert_eq!(
            h.worker.handle(text("B", "z", "S")).await,
            Handled::Stored(ContentKind::Text)
        );
    }

    #[tokio::test]
    async fn test_unknown_recall_sends_nothing() {
        let h = harness();

        assert_eq!(h.worker.handle(recall("9999")).await, Handled::Unresolved);
        assert_eq!(h.worker.handle(InboundEvent::Other).await, Handled::Ignored);
        assert!(h.sent.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_recall_after_retention_window() {
        let h = harness();

        h.worker.handle(text("1001", "x", "S")).await;
        h.clock.advance(Duration::minutes(6));
        h.worker.handle(recall("unrelated")).await;

        assert!(h.store.get_text("1001").unwrap().is_none());
        assert_eq!(h.worker.handle(recall("1001")).await, Handled::Unresolved);
    }

    #[tokio::test]
    async fn test_run_drains_queue_in_order() {
        let h = harness();
        let (tx, rx) = mpsc::channel(8);

        tx.send(text("1001", "hello", "Alice")).await.unwrap();
        tx.send(recall("1001")).await.unwrap();
        drop(tx);

        let sent = h.sent.clone();
        h.worker.run(rx).await;

        assert_eq!(sent.sent.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep_prunes_while_idle() {
        let h = harness();
        let worker = h.worker.with_sweep_interval(Some(std::time::Duration::from_secs(60)));
        let (tx, rx) = mpsc::channel(8);

        h.store.put_text("t1", "a", "S").unwrap();
        h.clock.advance(Duration::minutes(6));

        let task = tokio::spawn(worker.run(rx));
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;

        assert!(h.store.get_text("t1").unwrap().is_none());

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_tick_does_not_split_a_pending_recall() {
        let h = harness();
        let worker = h.worker.with_sweep_interval(Some(std::time::Duration::from_secs(60)));
        let (tx, rx) = mpsc::channel(8);

        // Aged past retention by the time the recall and the tick are both due
        h.store.put_image("2002", &[7, 7], "Bob").unwrap();
        h.store.put_text("old", "x", "S").unwrap();
        h.clock.advance(Duration::minutes(6));
        tx.send(recall("2002")).await.unwrap();

        let task = tokio::spawn(worker.run(rx));
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;
        drop(tx);
        task.await.unwrap();

        assert_eq!(
            *h.sent.sent.lock(),
            vec![
                Sent::Text("audit".to_string(), "Bob撤回的图片：".to_string()),
                Sent::Image("audit".to_string(), vec![7, 7]),
            ]
        );
        assert_eq!(h.store.count(ContentKind::Image).unwrap(), 0);
        assert_eq!(h.store.count(ContentKind::Text).unwrap(), 0);
    }
}
