use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::negotiation::{Negotiation, NegotiationStatus};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationEvent {
    Respond { accepted: bool },
    CounterOffer { price: Decimal },
    SweepTick,
}

impl NegotiationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Respond { .. } => "respond",
            Self::CounterOffer { .. } => "counter_offer",
            Self::SweepTick => "sweep_tick",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: NegotiationStatus,
    pub to: NegotiationStatus,
    pub event: NegotiationEvent,
    pub negotiation: Negotiation,
}

impl TransitionOutcome {
    /// A sweep tick on a negotiation that has not reached its deadline yields `from == to`.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}
