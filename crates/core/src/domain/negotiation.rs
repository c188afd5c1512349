use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NegotiationId(pub i64);

impl fmt::Display for NegotiationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NegotiationStatus {
    Pending,
    Rejected,
    Accepted,
    Expired,
    Closed,
}

impl NegotiationStatus {
    pub const NON_TERMINAL: [NegotiationStatus; 2] = [Self::Pending, Self::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rejected => "rejected",
            Self::Accepted => "accepted",
            Self::Expired => "expired",
            Self::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "rejected" => Some(Self::Rejected),
            "accepted" => Some(Self::Accepted),
            "expired" => Some(Self::Expired),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Accepted, Expired and Closed accept no further events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Expired | Self::Closed)
    }
}

/// A negotiation that has been decided on but not yet stored. The store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationDraft {
    pub product_id: ProductId,
    pub negotiator_name: String,
    pub initial_price: Decimal,
    pub proposed_price: Decimal,
    pub status: NegotiationStatus,
    pub attempts_count: u32,
    pub negotiation_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Negotiation {
    pub id: NegotiationId,
    pub product_id: ProductId,
    pub negotiator_name: String,
    pub initial_price: Decimal,
    pub proposed_price: Decimal,
    pub final_price: Option<Decimal>,
    pub status: NegotiationStatus,
    pub attempts_count: u32,
    pub negotiation_date: DateTime<Utc>,
    pub last_response_date: Option<DateTime<Utc>>,
    pub expiration_date: DateTime<Utc>,
    /// Optimistic concurrency token owned by the store.
    #[serde(default, skip_serializing)]
    pub state_version: u32,
}

impl Negotiation {
    pub fn from_draft(id: NegotiationId, draft: NegotiationDraft) -> Self {
        Self {
            id,
            product_id: draft.product_id,
            negotiator_name: draft.negotiator_name,
            initial_price: draft.initial_price,
            proposed_price: draft.proposed_price,
            final_price: None,
            status: draft.status,
            attempts_count: draft.attempts_count,
            negotiation_date: draft.negotiation_date,
            last_response_date: None,
            expiration_date: draft.expiration_date,
            state_version: 1,
        }
    }

    /// The deadline is exclusive: a negotiation is past it once `now` reaches `expiration_date`.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration_date
    }

    pub fn check_invariants(&self, max_attempts: u32) -> Result<(), DomainError> {
        if self.proposed_price <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "negotiation {} has non-positive proposed price {}",
                self.id, self.proposed_price
            )));
        }

        if self.attempts_count == 0 || self.attempts_count > max_attempts {
            return Err(DomainError::InvariantViolation(format!(
                "negotiation {} has attempts_count {} outside 1..={max_attempts}",
                self.id, self.attempts_count
            )));
        }

        let accepted = self.status == NegotiationStatus::Accepted;
        if accepted != self.final_price.is_some() {
            return Err(DomainError::InvariantViolation(format!(
                "negotiation {} has final_price {:?} while {:?}",
                self.id, self.final_price, self.status
            )));
        }

        if self.status == NegotiationStatus::Pending
            && self.expiration_date <= self.negotiation_date
        {
            return Err(DomainError::InvariantViolation(format!(
                "pending negotiation {} expires at or before its offer date",
                self.id
            )));
        }

        Ok(())
    }
}
