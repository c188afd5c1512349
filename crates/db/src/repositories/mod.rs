use async_trait::async_trait;
use thiserror::Error;

use haggle_core::domain::negotiation::{
    Negotiation, NegotiationDraft, NegotiationId, NegotiationStatus,
};
use haggle_core::domain::product::{Product, ProductId};

pub mod memory;
pub mod negotiation;
pub mod product;

pub use memory::{InMemoryNegotiationRepository, InMemoryProductRepository};
pub use negotiation::SqlNegotiationRepository;
pub use product::SqlProductRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("negotiation {id} was modified concurrently (expected version {expected_version})")]
    Conflict { id: NegotiationId, expected_version: u32 },
    #[error("negotiation {0} does not exist")]
    NotFound(NegotiationId),
}

#[async_trait]
pub trait NegotiationRepository: Send + Sync {
    async fn find_by_id(&self, id: NegotiationId) -> Result<Option<Negotiation>, RepositoryError>;

    /// Stores a new negotiation and returns it with its assigned id and `state_version = 1`.
    async fn insert(&self, draft: NegotiationDraft) -> Result<Negotiation, RepositoryError>;

    /// Compare-and-swap on `state_version`: the write lands only if the stored version still
    /// matches the one carried by `negotiation`. Returns the stored copy with the bumped version.
    async fn save(&self, negotiation: Negotiation) -> Result<Negotiation, RepositoryError>;

    async fn list_non_terminal(&self) -> Result<Vec<Negotiation>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Negotiation>, RepositoryError>;

    async fn list_by_status(
        &self,
        status: NegotiationStatus,
    ) -> Result<Vec<Negotiation>, RepositoryError>;

    async fn list_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Negotiation>, RepositoryError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn exists(&self, id: ProductId) -> Result<bool, RepositoryError>;
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<Product>, RepositoryError>;
}
