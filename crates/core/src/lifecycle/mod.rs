pub mod engine;
pub mod events;

pub use engine::{
    decision_audit_event, LifecycleError, LifecyclePolicy, NegotiationLifecycle, OfferKind,
};
pub use events::{NegotiationEvent, TransitionOutcome};
