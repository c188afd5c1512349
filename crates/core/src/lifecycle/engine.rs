//! Negotiation lifecycle decisions.
//!
//! Every transition a negotiation can take goes through [`NegotiationLifecycle::apply`]. The
//! request path (respond, counter-offer) and the expiration sweeper call the same function, and
//! it performs no I/O: callers pass the current snapshot and `now`, and persist the result.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::config::{NegotiationConfig, MAX_EXPIRATION_WINDOW_SECS};
use crate::domain::negotiation::{Negotiation, NegotiationDraft, NegotiationStatus};
use crate::domain::product::ProductId;
use crate::lifecycle::events::{NegotiationEvent, TransitionOutcome};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_EXPIRATION_WINDOW_DAYS: i64 = 7;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Offers a negotiation may hold, counting the initial one.
    pub max_attempts: u32,
    /// How long each offer stays open, measured from the moment it is made.
    pub expiration_window: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            expiration_window: Duration::days(DEFAULT_EXPIRATION_WINDOW_DAYS),
        }
    }
}

impl LifecyclePolicy {
    pub fn from_config(config: &NegotiationConfig) -> Self {
        let window_secs = config.expiration_window_secs.min(MAX_EXPIRATION_WINDOW_SECS);
        Self {
            max_attempts: config.max_attempts,
            expiration_window: Duration::seconds(
                i64::try_from(window_secs).unwrap_or(DEFAULT_EXPIRATION_WINDOW_DAYS * 86_400),
            ),
        }
    }
}

/// Which offer a price belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfferKind {
    Initial,
    Counter,
}

impl OfferKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Initial => "proposed price",
            Self::Counter => "counter offer price",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{} must be greater than 0 (got {price})", .offer.label())]
    InvalidPrice { price: Decimal, offer: OfferKind },
    #[error("negotiator name is required")]
    InvalidNegotiator,
    #[error("only pending negotiations can be responded to (status is {status:?})")]
    NotPending { status: NegotiationStatus },
    #[error("only rejected negotiations can receive counter offers (status is {status:?})")]
    NotRejected { status: NegotiationStatus },
    /// The negotiation was closed as part of this decision; `closed` must be persisted.
    #[error("maximum number of negotiation attempts reached ({max_attempts})")]
    MaxAttemptsExceeded { max_attempts: u32, closed: Box<Negotiation> },
    #[error("negotiation has expired (deadline {expiration_date})")]
    Expired { expiration_date: DateTime<Utc> },
    #[error("negotiation is {status:?} and accepts no further `{}` events", .event.name())]
    InvalidTransition { status: NegotiationStatus, event: NegotiationEvent },
}

impl LifecycleError {
    /// State that must be written even though the operation failed.
    pub fn committed_state(&self) -> Option<&Negotiation> {
        match self {
            Self::MaxAttemptsExceeded { closed, .. } => Some(closed),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPrice { .. } => "invalid_price",
            Self::InvalidNegotiator => "invalid_negotiator",
            Self::NotPending { .. } => "not_pending",
            Self::NotRejected { .. } => "not_rejected",
            Self::MaxAttemptsExceeded { .. } => "max_attempts_exceeded",
            Self::Expired { .. } => "expired",
            Self::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NegotiationLifecycle {
    policy: LifecyclePolicy,
}

impl NegotiationLifecycle {
    pub fn new(policy: LifecyclePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    /// Opens a negotiation at the catalog price snapshot taken by the caller.
    pub fn create(
        &self,
        product_id: ProductId,
        negotiator_name: &str,
        proposed_price: Decimal,
        catalog_price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<NegotiationDraft, LifecycleError> {
        ensure_positive(proposed_price, OfferKind::Initial)?;

        let negotiator_name = negotiator_name.trim();
        if negotiator_name.is_empty() {
            return Err(LifecycleError::InvalidNegotiator);
        }

        Ok(NegotiationDraft {
            product_id,
            negotiator_name: negotiator_name.to_string(),
            initial_price: catalog_price,
            proposed_price,
            status: NegotiationStatus::Pending,
            attempts_count: 1,
            negotiation_date: now,
            expiration_date: now + self.policy.expiration_window,
        })
    }

    pub fn respond(
        &self,
        negotiation: &Negotiation,
        accepted: bool,
        now: DateTime<Utc>,
    ) -> Result<Negotiation, LifecycleError> {
        self.apply(negotiation, &NegotiationEvent::Respond { accepted }, now)
            .map(|outcome| outcome.negotiation)
    }

    pub fn counter_offer(
        &self,
        negotiation: &Negotiation,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Negotiation, LifecycleError> {
        self.apply(negotiation, &NegotiationEvent::CounterOffer { price }, now)
            .map(|outcome| outcome.negotiation)
    }

    /// Expires the negotiation if its deadline has passed. Anything that is not eligible,
    /// including terminal negotiations, comes back unchanged.
    pub fn sweep_tick(&self, negotiation: &Negotiation, now: DateTime<Utc>) -> Negotiation {
        match self.apply(negotiation, &NegotiationEvent::SweepTick, now) {
            Ok(outcome) => outcome.negotiation,
            Err(_) => negotiation.clone(),
        }
    }

    pub fn apply(
        &self,
        current: &Negotiation,
        event: &NegotiationEvent,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        use NegotiationEvent::{CounterOffer, Respond, SweepTick};
        use NegotiationStatus::{Accepted, Closed, Expired, Pending, Rejected};

        if let CounterOffer { price } = event {
            ensure_positive(*price, OfferKind::Counter)?;
        }

        if current.status.is_terminal() {
            return Err(LifecycleError::InvalidTransition {
                status: current.status,
                event: event.clone(),
            });
        }

        let mut next = current.clone();
        match (current.status, event) {
            (Pending, Respond { accepted: true }) => {
                next.status = Accepted;
                next.final_price = Some(current.proposed_price);
                next.last_response_date = Some(now);
            }
            (Pending, Respond { accepted: false }) => {
                next.status = Rejected;
                next.last_response_date = Some(now);
            }
            (Rejected, CounterOffer { price }) => {
                // The cap is checked before the deadline: closing is the harder outcome.
                if current.attempts_count >= self.policy.max_attempts {
                    next.status = Closed;
                    return Err(LifecycleError::MaxAttemptsExceeded {
                        max_attempts: self.policy.max_attempts,
                        closed: Box::new(next),
                    });
                }
                if current.is_past_deadline(now) {
                    return Err(LifecycleError::Expired {
                        expiration_date: current.expiration_date,
                    });
                }
                next.status = Pending;
                next.proposed_price = *price;
                next.attempts_count = current.attempts_count + 1;
                next.negotiation_date = now;
                next.expiration_date = now + self.policy.expiration_window;
            }
            (Pending | Rejected, SweepTick) => {
                if current.is_past_deadline(now) {
                    next.status = Expired;
                }
            }
            (status, Respond { .. }) => return Err(LifecycleError::NotPending { status }),
            (status, CounterOffer { .. }) => return Err(LifecycleError::NotRejected { status }),
            (status, SweepTick) => {
                return Err(LifecycleError::InvalidTransition { status, event: event.clone() })
            }
        }

        Ok(TransitionOutcome {
            from: current.status,
            to: next.status,
            event: event.clone(),
            negotiation: next,
        })
    }

    /// Decides and records the decision immediately. Callers that persist the result should
    /// use [`apply`](Self::apply) and emit [`decision_audit_event`] once the write lands.
    pub fn apply_with_audit<S>(
        &self,
        current: &Negotiation,
        event: &NegotiationEvent,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, LifecycleError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, now);
        sink.emit(decision_audit_event(current, event, &result, audit));
        result
    }
}

/// Audit record for one lifecycle decision, applied or rejected.
pub fn decision_audit_event(
    current: &Negotiation,
    event: &NegotiationEvent,
    result: &Result<TransitionOutcome, LifecycleError>,
    audit: &AuditContext,
) -> AuditEvent {
    let category = match event {
        NegotiationEvent::SweepTick => AuditCategory::Sweep,
        _ => AuditCategory::Lifecycle,
    };
    match result {
        Ok(outcome) => AuditEvent::new(
            Some(current.id),
            audit.correlation_id.clone(),
            "negotiation.transition_applied",
            category,
            audit.actor.clone(),
            AuditOutcome::Success,
        )
        .with_metadata("from", outcome.from.as_str())
        .with_metadata("to", outcome.to.as_str())
        .with_metadata("event", event.name()),
        Err(error) => {
            let audit_event = AuditEvent::new(
                Some(current.id),
                audit.correlation_id.clone(),
                "negotiation.transition_rejected",
                category,
                audit.actor.clone(),
                AuditOutcome::Rejected,
            )
            .with_metadata("event", event.name())
            .with_metadata("error", error.kind());
            match error.committed_state() {
                Some(committed) => audit_event.with_metadata("to", committed.status.as_str()),
                None => audit_event,
            }
        }
    }
}

fn ensure_positive(price: Decimal, offer: OfferKind) -> Result<(), LifecycleError> {
    if price <= Decimal::ZERO {
        return Err(LifecycleError::InvalidPrice { price, offer });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
    use crate::domain::product::ProductId;
    use crate::lifecycle::engine::{
        LifecycleError, LifecyclePolicy, NegotiationLifecycle, OfferKind,
    };
    use crate::lifecycle::events::NegotiationEvent;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid timestamp")
    }

    fn price(units: i64) -> Decimal {
        Decimal::new(units, 0)
    }

    fn opened(lifecycle: &NegotiationLifecycle) -> Negotiation {
        let draft = lifecycle
            .create(ProductId(1), "Grace", price(100), price(200), t0())
            .expect("create negotiation");
        Negotiation::from_draft(NegotiationId(1), draft)
    }

    fn rejected(lifecycle: &NegotiationLifecycle, attempts: u32) -> Negotiation {
        let mut negotiation = lifecycle
            .respond(&opened(lifecycle), false, t0() + Duration::hours(1))
            .expect("pending -> rejected");
        negotiation.attempts_count = attempts;
        negotiation
    }

    #[test]
    fn create_snapshots_catalog_price_and_opens_first_attempt() {
        let lifecycle = NegotiationLifecycle::default();
        let draft = lifecycle
            .create(ProductId(1), "  Grace ", price(100), price(200), t0())
            .expect("create negotiation");

        assert_eq!(draft.status, NegotiationStatus::Pending);
        assert_eq!(draft.attempts_count, 1);
        assert_eq!(draft.initial_price, price(200));
        assert_eq!(draft.proposed_price, price(100));
        assert_eq!(draft.negotiator_name, "Grace");
        assert_eq!(draft.negotiation_date, t0());
        assert_eq!(draft.expiration_date, t0() + Duration::days(7));
    }

    #[test]
    fn create_rejects_non_positive_price() {
        let lifecycle = NegotiationLifecycle::default();
        for bad in [Decimal::ZERO, price(-5)] {
            let error = lifecycle
                .create(ProductId(1), "Grace", bad, price(200), t0())
                .expect_err("price must be positive");
            assert_eq!(
                error,
                LifecycleError::InvalidPrice { price: bad, offer: OfferKind::Initial }
            );
        }
    }

    #[test]
    fn create_rejects_blank_negotiator() {
        let lifecycle = NegotiationLifecycle::default();
        let error = lifecycle
            .create(ProductId(1), "   ", price(100), price(200), t0())
            .expect_err("name is required");
        assert_eq!(error, LifecycleError::InvalidNegotiator);
    }

    #[test]
    fn accepting_sets_final_price_and_response_date() {
        let lifecycle = NegotiationLifecycle::default();
        let at = t0() + Duration::hours(2);
        let accepted = lifecycle.respond(&opened(&lifecycle), true, at).expect("accept");

        assert_eq!(accepted.status, NegotiationStatus::Accepted);
        assert_eq!(accepted.final_price, Some(price(100)));
        assert_eq!(accepted.last_response_date, Some(at));
        accepted.check_invariants(3).expect("accepted negotiation is consistent");
    }

    #[test]
    fn rejecting_records_response_date_without_final_price() {
        let lifecycle = NegotiationLifecycle::default();
        let at = t0() + Duration::hours(3);
        let rejected = lifecycle.respond(&opened(&lifecycle), false, at).expect("reject");

        assert_eq!(rejected.status, NegotiationStatus::Rejected);
        assert_eq!(rejected.last_response_date, Some(at));
        assert_eq!(rejected.final_price, None);
    }

    #[test]
    fn responding_to_rejected_negotiation_is_not_pending() {
        let lifecycle = NegotiationLifecycle::default();
        let negotiation = rejected(&lifecycle, 1);
        let error = lifecycle.respond(&negotiation, true, t0()).expect_err("must be pending");
        assert_eq!(error, LifecycleError::NotPending { status: NegotiationStatus::Rejected });
    }

    #[test]
    fn counter_offer_reopens_and_refreshes_deadline() {
        let lifecycle = NegotiationLifecycle::default();
        let negotiation = rejected(&lifecycle, 1);
        let at = t0() + Duration::days(2);

        let countered = lifecycle.counter_offer(&negotiation, price(150), at).expect("counter");

        assert_eq!(countered.status, NegotiationStatus::Pending);
        assert_eq!(countered.proposed_price, price(150));
        assert_eq!(countered.attempts_count, 2);
        assert_eq!(countered.negotiation_date, at);
        assert_eq!(countered.expiration_date, at + Duration::days(7));
        assert_eq!(countered.initial_price, price(200));
    }

    #[test]
    fn counter_offer_on_pending_is_not_rejected() {
        let lifecycle = NegotiationLifecycle::default();
        let error = lifecycle
            .counter_offer(&opened(&lifecycle), price(120), t0())
            .expect_err("must be rejected first");
        assert_eq!(error, LifecycleError::NotRejected { status: NegotiationStatus::Pending });
    }

    #[test]
    fn counter_offer_rejects_non_positive_price_without_side_effects() {
        let lifecycle = NegotiationLifecycle::default();
        let negotiation = rejected(&lifecycle, 3);
        let error =
            lifecycle.counter_offer(&negotiation, Decimal::ZERO, t0()).expect_err("bad price");
        assert_eq!(
            error,
            LifecycleError::InvalidPrice { price: Decimal::ZERO, offer: OfferKind::Counter }
        );
        assert!(error.committed_state().is_none());
    }

    #[test]
    fn counter_offer_at_cap_closes_negotiation() {
        let lifecycle = NegotiationLifecycle::default();
        let negotiation = rejected(&lifecycle, 3);
        let error =
            lifecycle.counter_offer(&negotiation, price(180), t0()).expect_err("cap reached");

        let closed = error.committed_state().expect("closing is a committed change");
        assert_eq!(closed.status, NegotiationStatus::Closed);
        assert_eq!(closed.attempts_count, 3);
        assert_eq!(closed.proposed_price, negotiation.proposed_price);
        assert!(matches!(error, LifecycleError::MaxAttemptsExceeded { max_attempts: 3, .. }));
    }

    #[test]
    fn attempts_cap_takes_precedence_over_deadline() {
        let lifecycle = NegotiationLifecycle::default();
        let negotiation = rejected(&lifecycle, 3);
        let late = negotiation.expiration_date + Duration::days(1);

        let error = lifecycle.counter_offer(&negotiation, price(180), late).expect_err("blocked");
        assert!(matches!(error, LifecycleError::MaxAttemptsExceeded { .. }));
    }

    #[test]
    fn counter_offer_past_deadline_is_expired_and_unchanged() {
        let lifecycle = NegotiationLifecycle::default();
        let negotiation = rejected(&lifecycle, 1);

        let error = lifecycle
            .counter_offer(&negotiation, price(150), negotiation.expiration_date)
            .expect_err("deadline is exclusive");

        assert_eq!(error, LifecycleError::Expired { expiration_date: negotiation.expiration_date });
        assert!(error.committed_state().is_none());
    }

    #[test]
    fn terminal_states_reject_every_event() {
        let lifecycle = NegotiationLifecycle::default();
        let events = [
            NegotiationEvent::Respond { accepted: true },
            NegotiationEvent::CounterOffer { price: price(10) },
            NegotiationEvent::SweepTick,
        ];

        for status in
            [NegotiationStatus::Accepted, NegotiationStatus::Expired, NegotiationStatus::Closed]
        {
            let mut negotiation = opened(&lifecycle);
            negotiation.status = status;
            for event in &events {
                let error = lifecycle
                    .apply(&negotiation, event, t0() + Duration::days(30))
                    .expect_err("terminal state");
                assert_eq!(
                    error,
                    LifecycleError::InvalidTransition { status, event: event.clone() }
                );
            }
        }
    }

    #[test]
    fn sweep_tick_expires_pending_and_rejected_past_deadline() {
        let lifecycle = NegotiationLifecycle::default();
        for negotiation in [opened(&lifecycle), rejected(&lifecycle, 2)] {
            let later = negotiation.expiration_date + Duration::seconds(1);
            let swept = lifecycle.sweep_tick(&negotiation, later);
            assert_eq!(swept.status, NegotiationStatus::Expired);
            assert_eq!(swept.attempts_count, negotiation.attempts_count);
        }
    }

    #[test]
    fn sweep_tick_before_deadline_is_a_no_op() {
        let lifecycle = NegotiationLifecycle::default();
        let negotiation = opened(&lifecycle);
        let outcome = lifecycle
            .apply(&negotiation, &NegotiationEvent::SweepTick, t0() + Duration::days(1))
            .expect("sweep never fails on open negotiations");

        assert!(!outcome.changed());
        assert_eq!(outcome.negotiation, negotiation);
    }

    #[test]
    fn sweep_tick_is_idempotent() {
        let lifecycle = NegotiationLifecycle::default();
        let negotiation = opened(&lifecycle);
        let now = negotiation.expiration_date + Duration::hours(1);

        let once = lifecycle.sweep_tick(&negotiation, now);
        let twice = lifecycle.sweep_tick(&once, now);

        assert_eq!(once.status, NegotiationStatus::Expired);
        assert_eq!(once, twice);
    }

    #[test]
    fn scenario_three_counter_offers_end_closed() {
        let lifecycle = NegotiationLifecycle::default();
        let mut now = t0();
        let mut negotiation = opened(&lifecycle);
        let mut attempts_seen = vec![negotiation.attempts_count];

        negotiation = lifecycle.respond(&negotiation, false, now).expect("reject #1");
        for offer in [110, 120] {
            now += Duration::hours(1);
            negotiation =
                lifecycle.counter_offer(&negotiation, price(offer), now).expect("counter");
            attempts_seen.push(negotiation.attempts_count);
            negotiation = lifecycle.respond(&negotiation, false, now).expect("reject");
        }

        let error = lifecycle
            .counter_offer(&negotiation, price(130), now + Duration::hours(1))
            .expect_err("third counter-offer exceeds cap");
        let closed = error.committed_state().expect("closed snapshot");

        assert_eq!(attempts_seen, vec![1, 2, 3]);
        assert_eq!(closed.status, NegotiationStatus::Closed);
        assert!(closed.attempts_count <= lifecycle.policy().max_attempts);
        closed.check_invariants(3).expect("closed negotiation is consistent");
    }

    #[test]
    fn custom_policy_is_honoured() {
        let lifecycle = NegotiationLifecycle::new(LifecyclePolicy {
            max_attempts: 1,
            expiration_window: Duration::hours(1),
        });
        let negotiation = opened(&lifecycle);
        assert_eq!(negotiation.expiration_date, t0() + Duration::hours(1));

        let negotiation = lifecycle.respond(&negotiation, false, t0()).expect("reject");
        let error = lifecycle.counter_offer(&negotiation, price(90), t0()).expect_err("cap of 1");
        assert!(matches!(error, LifecycleError::MaxAttemptsExceeded { max_attempts: 1, .. }));
    }

    #[test]
    fn transition_emits_audit_event() {
        let lifecycle = NegotiationLifecycle::default();
        let sink = InMemoryAuditSink::default();
        let negotiation = opened(&lifecycle);

        lifecycle
            .apply_with_audit(
                &negotiation,
                &NegotiationEvent::Respond { accepted: false },
                t0(),
                &sink,
                &AuditContext::new(Some(negotiation.id), "req-42", "employee"),
            )
            .expect("transition should succeed");
        let _ = lifecycle.apply_with_audit(
            &negotiation,
            &NegotiationEvent::CounterOffer { price: price(1) },
            t0(),
            &sink,
            &AuditContext::new(Some(negotiation.id), "req-43", "buyer"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "negotiation.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("rejected"));
        assert_eq!(events[1].event_type, "negotiation.transition_rejected");
        assert_eq!(events[1].metadata.get("error").map(String::as_str), Some("not_rejected"));
        assert_eq!(events[1].correlation_id, "req-43");
    }
}
