//! Periodic expiration of negotiations whose deadline has passed.
//!
//! Each tick lists the non-terminal negotiations, runs them through the same lifecycle decision
//! as the request path, and saves the ones that changed. A failed or stuck save is logged and
//! skipped; the next tick picks it up again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use haggle_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use haggle_core::config::SweeperConfig;
use haggle_core::lifecycle::NegotiationLifecycle;
use haggle_db::NegotiationRepository;

use crate::clock::{Clock, SystemClock};
use crate::store::{bounded, StoreCallError};

const SWEEP_ACTOR: &str = "expiration-sweeper";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub expired: usize,
    pub unchanged: usize,
    /// Saves lost to a concurrent writer; the winner's state stands.
    pub conflicts: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct ExpirationSweeper {
    negotiations: Arc<dyn NegotiationRepository>,
    lifecycle: NegotiationLifecycle,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    store_timeout: Duration,
}

impl ExpirationSweeper {
    pub fn new(
        negotiations: Arc<dyn NegotiationRepository>,
        lifecycle: NegotiationLifecycle,
        config: &SweeperConfig,
    ) -> Self {
        Self {
            negotiations,
            lifecycle,
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
            interval: Duration::from_secs(config.interval_secs.max(1)),
            store_timeout: Duration::from_secs(config.store_timeout_secs.max(1)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub async fn run_once(&self) -> Result<SweepReport, StoreCallError> {
        let correlation_id = format!("sweep-{}", self.clock.now().timestamp());
        let candidates = bounded(
            "negotiation.list_non_terminal",
            self.store_timeout,
            self.negotiations.list_non_terminal(),
        )
        .await?;

        let mut report = SweepReport { candidates: candidates.len(), ..SweepReport::default() };
        info!(
            event_name = "negotiation.sweep.started",
            correlation_id = %correlation_id,
            candidates = report.candidates,
            "expiration sweep started"
        );

        for candidate in candidates {
            let now = self.clock.now();
            let next = self.lifecycle.sweep_tick(&candidate, now);
            if next.status == candidate.status {
                report.unchanged += 1;
                continue;
            }

            match bounded("negotiation.save", self.store_timeout, self.negotiations.save(next))
                .await
            {
                Ok(saved) => {
                    report.expired += 1;
                    info!(
                        event_name = "negotiation.sweep.expired",
                        correlation_id = %correlation_id,
                        negotiation_id = %saved.id,
                        from = candidate.status.as_str(),
                        expiration_date = %saved.expiration_date,
                        "negotiation expired"
                    );
                    self.audit.emit(
                        AuditEvent::new(
                            Some(saved.id),
                            correlation_id.clone(),
                            "negotiation.transition_applied",
                            AuditCategory::Sweep,
                            SWEEP_ACTOR,
                            AuditOutcome::Success,
                        )
                        .with_metadata("from", candidate.status.as_str())
                        .with_metadata("to", saved.status.as_str())
                        .with_metadata("event", "sweep_tick"),
                    );
                }
                Err(error) if error.is_conflict() => {
                    report.conflicts += 1;
                    debug!(
                        event_name = "negotiation.sweep.conflict",
                        correlation_id = %correlation_id,
                        negotiation_id = %candidate.id,
                        "negotiation changed during sweep; re-checked next tick"
                    );
                }
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        event_name = "negotiation.sweep.save_failed",
                        correlation_id = %correlation_id,
                        negotiation_id = %candidate.id,
                        error = %error,
                        "failed to persist expiration; continuing with the rest of the batch"
                    );
                    self.audit.emit(
                        AuditEvent::new(
                            Some(candidate.id),
                            correlation_id.clone(),
                            "negotiation.transition_failed",
                            AuditCategory::Persistence,
                            SWEEP_ACTOR,
                            AuditOutcome::Failed,
                        )
                        .with_metadata("event", "sweep_tick")
                        .with_metadata("error", error.to_string()),
                    );
                }
            }
        }

        info!(
            event_name = "negotiation.sweep.completed",
            correlation_id = %correlation_id,
            candidates = report.candidates,
            expired = report.expired,
            unchanged = report.unchanged,
            conflicts = report.conflicts,
            failed = report.failed,
            "expiration sweep completed"
        );
        Ok(report)
    }

    /// Ticks until `shutdown` flips to `true` or its sender is dropped. The first tick fires
    /// immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.run_once().await {
                        warn!(
                            event_name = "negotiation.sweep.failed",
                            correlation_id = "sweep",
                            error = %error,
                            "expiration sweep tick failed; retrying on next tick"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            event_name = "negotiation.sweep.stopped",
            correlation_id = "shutdown",
            "expiration sweeper stopped"
        );
    }

    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(self.run(receiver));
        SweeperHandle { shutdown, task }
    }
}

pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            warn!(
                event_name = "negotiation.sweep.join_failed",
                correlation_id = "shutdown",
                error = %error,
                "sweeper task did not shut down cleanly"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use haggle_core::audit::{AuditOutcome, InMemoryAuditSink};
    use haggle_core::config::SweeperConfig;
    use haggle_core::domain::negotiation::{
        Negotiation, NegotiationDraft, NegotiationId, NegotiationStatus,
    };
    use haggle_core::domain::product::ProductId;
    use haggle_core::lifecycle::NegotiationLifecycle;
    use haggle_db::{InMemoryNegotiationRepository, NegotiationRepository, RepositoryError};

    use super::{ExpirationSweeper, SweepReport};
    use crate::clock::ManualClock;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid timestamp")
    }

    fn config() -> SweeperConfig {
        SweeperConfig { enabled: true, interval_secs: 60, store_timeout_secs: 1 }
    }

    fn draft(opened_at: DateTime<Utc>) -> NegotiationDraft {
        NegotiationDraft {
            product_id: ProductId(1),
            negotiator_name: "Grace".to_string(),
            initial_price: Decimal::new(200, 0),
            proposed_price: Decimal::new(150, 0),
            status: NegotiationStatus::Pending,
            attempts_count: 1,
            negotiation_date: opened_at,
            expiration_date: opened_at + ChronoDuration::days(7),
        }
    }

    /// Delegates to the in-memory store but breaks `save` for selected ids.
    #[derive(Default)]
    struct FaultyRepository {
        inner: InMemoryNegotiationRepository,
        failing: HashSet<NegotiationId>,
        hanging: HashSet<NegotiationId>,
    }

    #[async_trait]
    impl NegotiationRepository for FaultyRepository {
        async fn find_by_id(
            &self,
            id: NegotiationId,
        ) -> Result<Option<Negotiation>, RepositoryError> {
            self.inner.find_by_id(id).await
        }

        async fn insert(&self, draft: NegotiationDraft) -> Result<Negotiation, RepositoryError> {
            self.inner.insert(draft).await
        }

        async fn save(&self, negotiation: Negotiation) -> Result<Negotiation, RepositoryError> {
            if self.failing.contains(&negotiation.id) {
                return Err(RepositoryError::Decode("disk full".to_string()));
            }
            if self.hanging.contains(&negotiation.id) {
                std::future::pending::<()>().await;
            }
            self.inner.save(negotiation).await
        }

        async fn list_non_terminal(&self) -> Result<Vec<Negotiation>, RepositoryError> {
            self.inner.list_non_terminal().await
        }

        async fn list_all(&self) -> Result<Vec<Negotiation>, RepositoryError> {
            self.inner.list_all().await
        }

        async fn list_by_status(
            &self,
            status: NegotiationStatus,
        ) -> Result<Vec<Negotiation>, RepositoryError> {
            self.inner.list_by_status(status).await
        }

        async fn list_by_product(
            &self,
            product_id: ProductId,
        ) -> Result<Vec<Negotiation>, RepositoryError> {
            self.inner.list_by_product(product_id).await
        }
    }

    async fn rejected(repo: &dyn NegotiationRepository, opened_at: DateTime<Utc>) -> Negotiation {
        let mut negotiation = repo.insert(draft(opened_at)).await.expect("insert");
        negotiation.status = NegotiationStatus::Rejected;
        negotiation.last_response_date = Some(opened_at + ChronoDuration::hours(1));
        repo.save(negotiation).await.expect("reject")
    }

    #[tokio::test]
    async fn sweep_expires_overdue_pending_and_rejected_only() {
        let repo = Arc::new(InMemoryNegotiationRepository::default());
        let overdue_pending = repo.insert(draft(t0())).await.expect("insert");
        let overdue_rejected = rejected(repo.as_ref(), t0()).await;
        let fresh = repo.insert(draft(t0() + ChronoDuration::days(5))).await.expect("insert");

        let mut accepted = repo.insert(draft(t0())).await.expect("insert");
        accepted.status = NegotiationStatus::Accepted;
        accepted.final_price = Some(accepted.proposed_price);
        let accepted = repo.save(accepted).await.expect("accept");

        let clock = Arc::new(ManualClock::new(t0() + ChronoDuration::days(8)));
        let audit = InMemoryAuditSink::default();
        let sweeper =
            ExpirationSweeper::new(repo.clone(), NegotiationLifecycle::default(), &config())
                .with_clock(clock)
                .with_audit_sink(Arc::new(audit.clone()));

        let report = sweeper.run_once().await.expect("sweep");
        assert_eq!(
            report,
            SweepReport { candidates: 3, expired: 2, unchanged: 1, conflicts: 0, failed: 0 }
        );

        for id in [overdue_pending.id, overdue_rejected.id] {
            let stored = repo.find_by_id(id).await.expect("find").expect("exists");
            assert_eq!(stored.status, NegotiationStatus::Expired);
        }
        let fresh = repo.find_by_id(fresh.id).await.expect("find").expect("exists");
        assert_eq!(fresh.status, NegotiationStatus::Pending);
        let untouched = repo.find_by_id(accepted.id).await.expect("find").expect("exists");
        assert_eq!(untouched, accepted);

        assert_eq!(audit.events().len(), 2);
    }

    #[tokio::test]
    async fn repeated_sweeps_are_no_ops() {
        let repo = Arc::new(InMemoryNegotiationRepository::default());
        let negotiation = repo.insert(draft(t0())).await.expect("insert");
        let sweeper =
            ExpirationSweeper::new(repo.clone(), NegotiationLifecycle::default(), &config())
                .with_clock(Arc::new(ManualClock::new(t0() + ChronoDuration::days(7))));

        let first = sweeper.run_once().await.expect("first sweep");
        assert_eq!(first.expired, 1);
        let after_first = repo.find_by_id(negotiation.id).await.expect("find").expect("exists");

        let second = sweeper.run_once().await.expect("second sweep");
        assert_eq!(second, SweepReport::default());
        let after_second = repo.find_by_id(negotiation.id).await.expect("find").expect("exists");
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn failed_save_does_not_stop_the_batch() {
        let mut repo = FaultyRepository::default();
        let broken = repo.insert(draft(t0())).await.expect("insert");
        let healthy = repo.insert(draft(t0())).await.expect("insert");
        repo.failing.insert(broken.id);
        let repo = Arc::new(repo);

        let audit = InMemoryAuditSink::default();
        let sweeper =
            ExpirationSweeper::new(repo.clone(), NegotiationLifecycle::default(), &config())
                .with_clock(Arc::new(ManualClock::new(t0() + ChronoDuration::days(8))))
                .with_audit_sink(Arc::new(audit.clone()));

        let report = sweeper.run_once().await.expect("sweep");
        assert_eq!(report.failed, 1);
        assert_eq!(report.expired, 1);

        let events = audit.events();
        let failed = events
            .iter()
            .filter(|event| event.outcome == AuditOutcome::Failed)
            .map(|event| event.negotiation_id)
            .collect::<Vec<_>>();
        assert_eq!(failed, vec![Some(broken.id)]);
        assert_eq!(events.len(), 2, "one applied expiration and one failed save");

        let healthy = repo.find_by_id(healthy.id).await.expect("find").expect("exists");
        assert_eq!(healthy.status, NegotiationStatus::Expired);
        let broken = repo.find_by_id(broken.id).await.expect("find").expect("exists");
        assert_eq!(broken.status, NegotiationStatus::Pending);

        // The next tick retries the batch; only the record that failed is still a candidate.
        let retry = sweeper.run_once().await.expect("retry sweep");
        assert_eq!(retry.candidates, 1);
        assert_eq!(retry.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_save_times_out_and_sweep_moves_on() {
        let mut repo = FaultyRepository::default();
        let stuck = repo.insert(draft(t0())).await.expect("insert");
        let healthy = repo.insert(draft(t0())).await.expect("insert");
        repo.hanging.insert(stuck.id);
        let repo = Arc::new(repo);

        let sweeper =
            ExpirationSweeper::new(repo.clone(), NegotiationLifecycle::default(), &config())
                .with_clock(Arc::new(ManualClock::new(t0() + ChronoDuration::days(8))))
                .with_store_timeout(Duration::from_millis(50));

        let report = sweeper.run_once().await.expect("sweep");
        assert_eq!(report.failed, 1);
        assert_eq!(report.expired, 1);

        let healthy = repo.find_by_id(healthy.id).await.expect("find").expect("exists");
        assert_eq!(healthy.status, NegotiationStatus::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sweeper_ticks_and_stops() {
        let repo = Arc::new(InMemoryNegotiationRepository::default());
        let negotiation = repo.insert(draft(t0())).await.expect("insert");
        let sweeper =
            ExpirationSweeper::new(repo.clone(), NegotiationLifecycle::default(), &config())
                .with_clock(Arc::new(ManualClock::new(t0() + ChronoDuration::days(8))));

        let handle = sweeper.spawn();
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop().await;

        let stored = repo.find_by_id(negotiation.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, NegotiationStatus::Expired);
    }
}
