use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use haggle_db::{migrations::MIGRATOR, DbPool};
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Check {
    pub status: CheckStatus,
    pub detail: String,
}

impl Check {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: CheckStatus::Ready, detail: detail.into() }
    }

    fn degraded(check: &'static str, detail: String) -> Self {
        warn!(
            event_name = "system.health.check_degraded",
            correlation_id = "health",
            check,
            detail = %detail,
            "health check degraded"
        );
        Self { status: CheckStatus::Degraded, detail }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: CheckStatus,
    pub database: Check,
    pub schema: Check,
    pub schema_version: Option<i64>,
    pub checked_at: DateTime<Utc>,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let database = database_check(&state.db_pool).await;
    let (schema, schema_version) = schema_check(&state.db_pool).await;
    let ready = database.status == CheckStatus::Ready && schema.status == CheckStatus::Ready;

    let report = HealthReport {
        status: if ready { CheckStatus::Ready } else { CheckStatus::Degraded },
        database,
        schema,
        schema_version,
        checked_at: Utc::now(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(report))
}

async fn database_check(pool: &DbPool) -> Check {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => Check::ready("database query succeeded"),
        Err(error) => Check::degraded("database", format!("database query failed: {error}")),
    }
}

/// Compares the newest applied migration with the newest one compiled into the binary.
async fn schema_check(pool: &DbPool) -> (Check, Option<i64>) {
    let expected = MIGRATOR.iter().map(|migration| migration.version).max();
    let applied = sqlx::query_scalar::<_, Option<i64>>(
        "SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_one(pool)
    .await;

    match applied {
        Ok(applied) if applied == expected => {
            (Check::ready("schema is up to date"), applied)
        }
        Ok(applied) => (
            Check::degraded(
                "schema",
                format!("schema version {applied:?} does not match expected {expected:?}"),
            ),
            applied,
        ),
        Err(error) => {
            (Check::degraded("schema", format!("migration history unavailable: {error}")), None)
        }
    }
}
