//! Demo catalog used by `haggle seed` and by integration tests.

use rust_decimal::Decimal;

use haggle_core::domain::product::{Product, ProductId};

use crate::repositories::{ProductRepository, RepositoryError};

/// Fixed set of products with stable ids, so seeding twice leaves the catalog unchanged.
pub struct DemoCatalog;

impl DemoCatalog {
    pub fn products() -> Vec<Product> {
        [
            (1, "Walnut desk", "Solid walnut writing desk, 160cm", 89_900, 4),
            (2, "Oak dining chair", "Oiled oak chair with woven seat", 12_000, 24),
            (3, "Linen sofa", "Three-seat sofa in washed linen", 149_500, 2),
            (4, "Brass floor lamp", "Adjustable arm, warm white bulb included", 21_950, 9),
            (5, "Wool rug", "Hand-tufted rug, 200x300cm", 54_000, 0),
        ]
        .into_iter()
        .map(|(id, name, description, cents, quantity)| Product {
            id: ProductId(id),
            name: name.to_string(),
            description: description.to_string(),
            price: Decimal::new(cents, 2),
            quantity,
        })
        .collect()
    }

    pub async fn load<R>(repository: &R) -> Result<SeedResult, RepositoryError>
    where
        R: ProductRepository + ?Sized,
    {
        let products = Self::products();
        let mut seeded = Vec::with_capacity(products.len());
        for product in products {
            seeded.push(product.id);
            repository.save(product).await?;
        }
        Ok(SeedResult { products_seeded: seeded })
    }

    pub async fn verify<R>(repository: &R) -> Result<VerificationResult, RepositoryError>
    where
        R: ProductRepository + ?Sized,
    {
        let mut checks = Vec::new();
        for expected in Self::products() {
            let found = repository.find_by_id(expected.id).await?;
            checks.push((expected.id, found.as_ref() == Some(&expected)));
        }
        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub products_seeded: Vec<ProductId>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(ProductId, bool)>,
}
