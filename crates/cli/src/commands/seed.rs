use haggle_core::domain::product::ProductId;
use haggle_db::{DemoCatalog, SqlProductRepository};

use crate::commands::{with_migrated_pool, CommandResult};

pub fn run() -> CommandResult {
    let result = with_migrated_pool("seed", |pool| async move {
        let repository = SqlProductRepository::new(pool);

        let seeded = DemoCatalog::load(&repository)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoCatalog::verify(&repository)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        if !verification.all_present {
            let missing = verification
                .checks
                .iter()
                .filter_map(|(id, present)| (!present).then_some(*id))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_failure_message(&missing), 6u8));
        }

        Ok(format!(
            "demo catalog loaded: {} products (ids {})",
            seeded.products_seeded.len(),
            join_ids(&seeded.products_seeded)
        ))
    });

    match result {
        Ok(message) => CommandResult::success("seed", message),
        Err(failure) => failure,
    }
}

fn verification_failure_message(missing: &[ProductId]) -> String {
    if missing.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for products: {}", join_ids(missing))
    }
}

fn join_ids(ids: &[ProductId]) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use haggle_core::domain::product::ProductId;

    use super::verification_failure_message;

    #[test]
    fn verification_error_message_targets_missing_products() {
        assert_eq!(
            verification_failure_message(&[ProductId(2), ProductId(5)]),
            "Seed verification failed for products: 2, 5"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_ids() {
        assert_eq!(verification_failure_message(&[]), "Some seed data failed to load");
    }
}
