pub mod api;
pub mod bootstrap;
pub mod clock;
pub mod health;
pub mod identity;
pub mod service;
pub mod store;
pub mod sweeper;

pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use service::{NegotiationService, NewNegotiation, RequestContext};
pub use sweeper::{ExpirationSweeper, SweepReport, SweeperHandle};
