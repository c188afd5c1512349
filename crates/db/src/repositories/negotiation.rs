use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use haggle_core::domain::negotiation::{
    Negotiation, NegotiationDraft, NegotiationId, NegotiationStatus,
};
use haggle_core::domain::product::ProductId;

use super::{NegotiationRepository, RepositoryError};
use crate::DbPool;

const SELECT_NEGOTIATION: &str = "SELECT
        id,
        product_id,
        negotiator_name,
        initial_price,
        proposed_price,
        final_price,
        status,
        attempts_count,
        negotiation_date,
        last_response_date,
        expiration_date,
        state_version
     FROM negotiation";

pub struct SqlNegotiationRepository {
    pool: DbPool,
}

impl SqlNegotiationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl NegotiationRepository for SqlNegotiationRepository {
    async fn find_by_id(&self, id: NegotiationId) -> Result<Option<Negotiation>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_NEGOTIATION} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(negotiation_from_row).transpose()
    }

    async fn insert(&self, draft: NegotiationDraft) -> Result<Negotiation, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO negotiation (
                product_id,
                negotiator_name,
                initial_price,
                proposed_price,
                final_price,
                status,
                attempts_count,
                negotiation_date,
                last_response_date,
                expiration_date,
                state_version
             ) VALUES (?, ?, ?, ?, NULL, ?, ?, ?, NULL, ?, 1)",
        )
        .bind(draft.product_id.0)
        .bind(&draft.negotiator_name)
        .bind(draft.initial_price.to_string())
        .bind(draft.proposed_price.to_string())
        .bind(draft.status.as_str())
        .bind(i64::from(draft.attempts_count))
        .bind(draft.negotiation_date.to_rfc3339())
        .bind(draft.expiration_date.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(Negotiation::from_draft(NegotiationId(result.last_insert_rowid()), draft))
    }

    async fn save(&self, negotiation: Negotiation) -> Result<Negotiation, RepositoryError> {
        let expected_version = negotiation.state_version;
        let next_version = expected_version.checked_add(1).ok_or_else(|| {
            RepositoryError::Decode(format!(
                "state_version overflow for negotiation {}",
                negotiation.id
            ))
        })?;

        let result = sqlx::query(
            "UPDATE negotiation SET
                proposed_price = ?,
                final_price = ?,
                status = ?,
                attempts_count = ?,
                negotiation_date = ?,
                last_response_date = ?,
                expiration_date = ?,
                state_version = ?
             WHERE id = ? AND state_version = ?",
        )
        .bind(negotiation.proposed_price.to_string())
        .bind(negotiation.final_price.map(|price| price.to_string()))
        .bind(negotiation.status.as_str())
        .bind(i64::from(negotiation.attempts_count))
        .bind(negotiation.negotiation_date.to_rfc3339())
        .bind(negotiation.last_response_date.map(|value| value.to_rfc3339()))
        .bind(negotiation.expiration_date.to_rfc3339())
        .bind(i64::from(next_version))
        .bind(negotiation.id.0)
        .bind(i64::from(expected_version))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM negotiation WHERE id = ?")
                .bind(negotiation.id.0)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            return Err(if exists {
                RepositoryError::Conflict { id: negotiation.id, expected_version }
            } else {
                RepositoryError::NotFound(negotiation.id)
            });
        }

        Ok(Negotiation { state_version: next_version, ..negotiation })
    }

    async fn list_non_terminal(&self) -> Result<Vec<Negotiation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_NEGOTIATION} WHERE status IN ('pending', 'rejected') \
             ORDER BY expiration_date ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(negotiation_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<Negotiation>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_NEGOTIATION} ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(negotiation_from_row).collect()
    }

    async fn list_by_status(
        &self,
        status: NegotiationStatus,
    ) -> Result<Vec<Negotiation>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_NEGOTIATION} WHERE status = ? ORDER BY id ASC"))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(negotiation_from_row).collect()
    }

    async fn list_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<Negotiation>, RepositoryError> {
        let rows =
            sqlx::query(&format!("{SELECT_NEGOTIATION} WHERE product_id = ? ORDER BY id ASC"))
                .bind(product_id.0)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(negotiation_from_row).collect()
    }
}

fn negotiation_from_row(row: SqliteRow) -> Result<Negotiation, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = NegotiationStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown negotiation status `{status_raw}`"))
    })?;

    Ok(Negotiation {
        id: NegotiationId(row.try_get("id")?),
        product_id: ProductId(row.try_get("product_id")?),
        negotiator_name: row.try_get("negotiator_name")?,
        initial_price: parse_decimal("initial_price", row.try_get("initial_price")?)?,
        proposed_price: parse_decimal("proposed_price", row.try_get("proposed_price")?)?,
        final_price: row
            .try_get::<Option<String>, _>("final_price")?
            .map(|value| parse_decimal("final_price", value))
            .transpose()?,
        status,
        attempts_count: parse_u32("attempts_count", row.try_get("attempts_count")?)?,
        negotiation_date: parse_timestamp("negotiation_date", row.try_get("negotiation_date")?)?,
        last_response_date: parse_optional_timestamp(
            "last_response_date",
            row.try_get("last_response_date")?,
        )?,
        expiration_date: parse_timestamp("expiration_date", row.try_get("expiration_date")?)?,
        state_version: parse_u32("state_version", row.try_get("state_version")?)?,
    })
}

pub(super) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(super) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}
