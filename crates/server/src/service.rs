//! Request-path orchestration: load, decide with [`NegotiationLifecycle`], persist.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{info, warn};

use haggle_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use haggle_core::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
use haggle_core::domain::product::ProductId;
use haggle_core::errors::{ApplicationError, DomainError};
use haggle_core::lifecycle::{decision_audit_event, NegotiationEvent, NegotiationLifecycle};
use haggle_db::{NegotiationRepository, ProductRepository};

use crate::clock::{Clock, SystemClock};
use crate::identity::Caller;
use crate::store::{bounded, StoreCallError};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub correlation_id: String,
    pub caller: Caller,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>, caller: Caller) -> Self {
        Self { correlation_id: correlation_id.into(), caller }
    }

    fn audit(&self, negotiation_id: Option<NegotiationId>) -> AuditContext {
        AuditContext::new(negotiation_id, self.correlation_id.clone(), self.caller.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewNegotiation {
    pub product_id: ProductId,
    pub negotiator_name: String,
    pub proposed_price: Decimal,
}

#[derive(Clone)]
pub struct NegotiationService {
    negotiations: Arc<dyn NegotiationRepository>,
    products: Arc<dyn ProductRepository>,
    lifecycle: NegotiationLifecycle,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl NegotiationService {
    pub fn new(
        negotiations: Arc<dyn NegotiationRepository>,
        products: Arc<dyn ProductRepository>,
        lifecycle: NegotiationLifecycle,
    ) -> Self {
        Self {
            negotiations,
            products,
            lifecycle,
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
            store_timeout: DEFAULT_STORE_TIMEOUT,
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

    pub fn lifecycle(&self) -> &NegotiationLifecycle {
        &self.lifecycle
    }

    pub async fn create(
        &self,
        request: NewNegotiation,
        context: &RequestContext,
    ) -> Result<Negotiation, ApplicationError> {
        let product = bounded(
            "product.find_by_id",
            self.store_timeout,
            self.products.find_by_id(request.product_id),
        )
        .await?
        .ok_or(DomainError::ProductNotFound(request.product_id))?;

        let draft = self.lifecycle.create(
            product.id,
            &request.negotiator_name,
            request.proposed_price,
            product.price,
            self.clock.now(),
        )?;
        let negotiation =
            bounded("negotiation.insert", self.store_timeout, self.negotiations.insert(draft))
                .await?;

        self.audit.emit(
            AuditEvent::new(
                Some(negotiation.id),
                context.correlation_id.clone(),
                "negotiation.created",
                AuditCategory::Ingress,
                context.caller.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("product_id", product.id.to_string())
            .with_metadata("proposed_price", negotiation.proposed_price.to_string())
            .with_metadata("initial_price", negotiation.initial_price.to_string()),
        );

        Ok(negotiation)
    }

    pub async fn get(&self, id: NegotiationId) -> Result<Negotiation, ApplicationError> {
        self.load(id).await
    }

    pub async fn list(
        &self,
        status: Option<NegotiationStatus>,
        context: &RequestContext,
    ) -> Result<Vec<Negotiation>, ApplicationError> {
        if !context.caller.is_employee() {
            return Err(ApplicationError::Forbidden("view all negotiations".to_owned()));
        }

        let negotiations = match status {
            Some(status) => {
                bounded(
                    "negotiation.list_by_status",
                    self.store_timeout,
                    self.negotiations.list_by_status(status),
                )
                .await?
            }
            None => {
                bounded("negotiation.list_all", self.store_timeout, self.negotiations.list_all())
                    .await?
            }
        };
        Ok(negotiations)
    }

    pub async fn list_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Negotiation>, ApplicationError> {
        let negotiations = bounded(
            "negotiation.list_by_product",
            self.store_timeout,
            self.negotiations.list_by_product(product_id),
        )
        .await?;
        Ok(negotiations)
    }

    pub async fn respond(
        &self,
        id: NegotiationId,
        accepted: bool,
        context: &RequestContext,
    ) -> Result<Negotiation, ApplicationError> {
        if !context.caller.is_employee() {
            return Err(ApplicationError::Forbidden("respond to negotiations".to_owned()));
        }
        self.transition(id, NegotiationEvent::Respond { accepted }, context).await
    }

    pub async fn counter_offer(
        &self,
        id: NegotiationId,
        price: Decimal,
        context: &RequestContext,
    ) -> Result<Negotiation, ApplicationError> {
        self.transition(id, NegotiationEvent::CounterOffer { price }, context).await
    }

    /// Decides against a fresh snapshot and writes with a version check. A lost race is
    /// retried once from a reload, so the loser sees the ordinary precondition error. Audit
    /// events follow the write: a decision that never lands is not recorded as applied.
    async fn transition(
        &self,
        id: NegotiationId,
        event: NegotiationEvent,
        context: &RequestContext,
    ) -> Result<Negotiation, ApplicationError> {
        let audit = context.audit(Some(id));
        let mut retried = false;

        loop {
            let current = self.load(id).await?;
            let decision = self.lifecycle.apply(&current, &event, self.clock.now());

            let to_save = match &decision {
                Ok(outcome) => outcome.negotiation.clone(),
                Err(error) => match error.committed_state() {
                    Some(committed) => committed.clone(),
                    None => {
                        self.audit.emit(decision_audit_event(&current, &event, &decision, &audit));
                        return Err(error.clone().into());
                    }
                },
            };
            to_save.check_invariants(self.lifecycle.policy().max_attempts)?;

            match self.save(to_save).await {
                Ok(saved) => {
                    self.audit.emit(decision_audit_event(&current, &event, &decision, &audit));
                    return match decision {
                        Ok(_) => Ok(saved),
                        Err(error) => {
                            info!(
                                event_name = "negotiation.closed",
                                correlation_id = %context.correlation_id,
                                negotiation_id = %id,
                                attempts_count = saved.attempts_count,
                                "attempt cap reached; negotiation closed"
                            );
                            Err(error.into())
                        }
                    };
                }
                Err(error) if error.is_conflict() && !retried => {
                    warn!(
                        event_name = "negotiation.save.conflict_retry",
                        correlation_id = %context.correlation_id,
                        negotiation_id = %id,
                        event = event.name(),
                        "negotiation changed underneath the request; re-deciding from a reload"
                    );
                    retried = true;
                }
                Err(error) => {
                    self.audit.emit(
                        AuditEvent::new(
                            Some(id),
                            context.correlation_id.clone(),
                            "negotiation.transition_failed",
                            AuditCategory::Persistence,
                            context.caller.as_str(),
                            AuditOutcome::Failed,
                        )
                        .with_metadata("event", event.name())
                        .with_metadata("error", error.to_string()),
                    );
                    return Err(error.into());
                }
            }
        }
    }

    async fn load(&self, id: NegotiationId) -> Result<Negotiation, ApplicationError> {
        bounded("negotiation.find_by_id", self.store_timeout, self.negotiations.find_by_id(id))
            .await?
            .ok_or_else(|| DomainError::NegotiationNotFound(id).into())
    }

    async fn save(&self, negotiation: Negotiation) -> Result<Negotiation, StoreCallError> {
        bounded("negotiation.save", self.store_timeout, self.negotiations.save(negotiation)).await
    }
}
