use std::collections::BTreeMap;

use tokio::sync::RwLock;

use haggle_core::domain::negotiation::{
    Negotiation, NegotiationDraft, NegotiationId, NegotiationStatus,
};
use haggle_core::domain::product::{Product, ProductId};

use super::{NegotiationRepository, ProductRepository, RepositoryError};

#[derive(Default)]
struct NegotiationTable {
    next_id: i64,
    rows: BTreeMap<NegotiationId, Negotiation>,
}

/// Keeps the same `state_version` rules as the SQL store, so services can be tested without a
/// database.
#[derive(Default)]
pub struct InMemoryNegotiationRepository {
    table: RwLock<NegotiationTable>,
}

impl InMemoryNegotiationRepository {
    fn filtered(
        table: &NegotiationTable,
        keep: impl Fn(&Negotiation) -> bool,
    ) -> Vec<Negotiation> {
        table.rows.values().filter(|negotiation| keep(negotiation)).cloned().collect()
    }
}

#[async_trait::async_trait]
impl NegotiationRepository for InMemoryNegotiationRepository {
    async fn find_by_id(&self, id: NegotiationId) -> Result<Option<Negotiation>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn insert(&self, draft: NegotiationDraft) -> Result<Negotiation, RepositoryError> {
        let mut table = self.table.write().await;
        table.next_id += 1;
        let negotiation = Negotiation::from_draft(NegotiationId(table.next_id), draft);
        table.rows.insert(negotiation.id, negotiation.clone());
        Ok(negotiation)
    }

    async fn save(&self, negotiation: Negotiation) -> Result<Negotiation, RepositoryError> {
        let mut table = self.table.write().await;
        let stored = table
            .rows
            .get_mut(&negotiation.id)
            .ok_or(RepositoryError::NotFound(negotiation.id))?;

        if stored.state_version != negotiation.state_version {
            return Err(RepositoryError::Conflict {
                id: negotiation.id,
                expected_version: negotiation.state_version,
            });
        }

        let saved =
            Negotiation { state_version: negotiation.state_version + 1, ..negotiation };
        *stored = saved.clone();
        Ok(saved)
    }

    async fn list_non_terminal(&self) -> Result<Vec<Negotiation>, RepositoryError> {
        let table = self.table.read().await;
        let mut rows = Self::filtered(&table, |negotiation| !negotiation.status.is_terminal());
        rows.sort_by_key(|negotiation| (negotiation.expiration_date, negotiation.id));
        Ok(rows)
    }

    async fn list_all(&self) -> Result<Vec<Negotiation>, RepositoryError> {
        let table = self.table.read().await;
        Ok(Self::filtered(&table, |_| true))
    }

    async fn list_by_status(
        &self,
        status: NegotiationStatus,
    ) -> Result<Vec<Negotiation>, RepositoryError> {
        let table = self.table.read().await;
        Ok(Self::filtered(&table, |negotiation| negotiation.status == status))
    }

    async fn list_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Negotiation>, RepositoryError> {
        let table = self.table.read().await;
        Ok(Self::filtered(&table, |negotiation| negotiation.product_id == product_id))
    }
}

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<BTreeMap<ProductId, Product>>,
}

#[async_trait::async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(&id).cloned())
    }

    async fn exists(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.contains_key(&id))
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        products.insert(product.id, product);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.values().cloned().collect())
    }
}
