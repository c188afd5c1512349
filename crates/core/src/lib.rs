pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use domain::negotiation::{Negotiation, NegotiationDraft, NegotiationId, NegotiationStatus};
pub use domain::product::{Product, ProductId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use lifecycle::{
    LifecycleError, LifecyclePolicy, NegotiationEvent, NegotiationLifecycle, OfferKind,
    TransitionOutcome,
};
