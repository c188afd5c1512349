use thiserror::Error;

use crate::domain::negotiation::NegotiationId;
use crate::domain::product::ProductId;
use crate::lifecycle::{LifecycleError, OfferKind};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("product {0} does not exist")]
    ProductNotFound(ProductId),
    #[error("negotiation {0} not found")]
    NegotiationNotFound(NegotiationId),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("caller is not allowed to {0}")]
    Forbidden(String),
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("store call timed out: {0}")]
    Timeout(String),
}

impl From<LifecycleError> for ApplicationError {
    fn from(value: LifecycleError) -> Self {
        Self::Domain(DomainError::Lifecycle(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Domain rejections are safe to show verbatim; infrastructure details are not.
    pub fn user_message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. } => message,
            Self::Conflict { .. } => {
                "The negotiation was changed by another request. Reload it and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::NegotiationNotFound(id)) => Self::NotFound {
                message: format!("Negotiation with ID {id} not found."),
                correlation_id,
            },
            ApplicationError::Domain(DomainError::ProductNotFound(_)) => {
                Self::BadRequest { message: "Product does not exist".to_owned(), correlation_id }
            }
            ApplicationError::Domain(DomainError::Lifecycle(error)) => {
                Self::BadRequest { message: lifecycle_message(&error), correlation_id }
            }
            ApplicationError::Domain(DomainError::InvariantViolation(message)) => {
                Self::Internal { message, correlation_id }
            }
            ApplicationError::Forbidden(action) => {
                Self::Forbidden { message: format!("Only employees can {action}"), correlation_id }
            }
            ApplicationError::Conflict(message) => Self::Conflict { message, correlation_id },
            ApplicationError::Persistence(message) | ApplicationError::Timeout(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
        }
    }
}

fn lifecycle_message(error: &LifecycleError) -> String {
    match error {
        LifecycleError::InvalidPrice { offer: OfferKind::Initial, .. } => {
            "Proposed price must be greater than 0".to_owned()
        }
        LifecycleError::InvalidPrice { offer: OfferKind::Counter, .. } => {
            "Counter offer price must be greater than 0".to_owned()
        }
        LifecycleError::InvalidNegotiator => "Negotiator name is required".to_owned(),
        LifecycleError::NotPending { .. } => {
            "Only pending negotiations can be responded to".to_owned()
        }
        LifecycleError::NotRejected { .. } => {
            "Only rejected negotiations can receive counter offers".to_owned()
        }
        LifecycleError::MaxAttemptsExceeded { .. } => {
            "Maximum number of negotiation attempts reached".to_owned()
        }
        LifecycleError::Expired { .. } => "Negotiation has expired".to_owned(),
        LifecycleError::InvalidTransition { .. } => error.to_string(),
    }
}
