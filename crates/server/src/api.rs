use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use haggle_core::domain::negotiation::{Negotiation, NegotiationId, NegotiationStatus};
use haggle_core::domain::product::ProductId;
use haggle_core::errors::{ApplicationError, InterfaceError};

use crate::identity::IdentityResolver;
use crate::service::{NegotiationService, NewNegotiation, RequestContext};

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    service: NegotiationService,
    identity: IdentityResolver,
}

impl ApiState {
    pub fn new(service: NegotiationService, identity: IdentityResolver) -> Self {
        Self { service, identity }
    }

    fn context(&self, headers: &HeaderMap) -> RequestContext {
        let correlation_id = headers
            .get(CORRELATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        RequestContext::new(correlation_id, self.identity.resolve(headers))
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/negotiations", get(list_negotiations).post(create_negotiation))
        .route("/api/v1/negotiations/{id}", get(get_negotiation))
        .route("/api/v1/negotiations/{id}/respond", put(respond))
        .route("/api/v1/negotiations/{id}/counteroffer", put(counter_offer))
        .route("/api/v1/products/{id}/negotiations", get(list_product_negotiations))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNegotiationRequest {
    pub product_id: i64,
    pub negotiator_name: String,
    pub proposed_price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    pub is_accepted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterOfferRequest {
    pub proposed_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn from_application(error: ApplicationError, context: &RequestContext) -> Self {
        warn!(
            event_name = "negotiation.request.rejected",
            correlation_id = %context.correlation_id,
            caller = context.caller.as_str(),
            error = %error,
            "request failed"
        );
        Self(error.into_interface(context.correlation_id.clone()))
    }

    fn bad_request(message: impl Into<String>, context: &RequestContext) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: context.correlation_id.clone(),
        })
    }
}

pub fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_code(error: &InterfaceError) -> &'static str {
    match error {
        InterfaceError::BadRequest { .. } => "bad_request",
        InterfaceError::Forbidden { .. } => "forbidden",
        InterfaceError::NotFound { .. } => "not_found",
        InterfaceError::Conflict { .. } => "conflict",
        InterfaceError::ServiceUnavailable { .. } => "service_unavailable",
        InterfaceError::Internal { .. } => "internal",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: error_code(&self.0),
            message: self.0.user_message().to_owned(),
            correlation_id: self.0.correlation_id().to_owned(),
        };
        (status_for(&self.0), Json(body)).into_response()
    }
}

async fn create_negotiation(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<CreateNegotiationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Negotiation>), ApiError> {
    let context = state.context(&headers);
    let Json(request) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &context))?;

    let negotiation = state
        .service
        .create(
            NewNegotiation {
                product_id: ProductId(request.product_id),
                negotiator_name: request.negotiator_name,
                proposed_price: request.proposed_price,
            },
            &context,
        )
        .await
        .map_err(|error| ApiError::from_application(error, &context))?;

    info!(
        event_name = "negotiation.request.created",
        correlation_id = %context.correlation_id,
        negotiation_id = %negotiation.id,
        "negotiation created"
    );
    Ok((StatusCode::CREATED, Json(negotiation)))
}

async fn list_negotiations(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Negotiation>>, ApiError> {
    let context = state.context(&headers);
    let status = match query.status.as_deref() {
        Some(raw) => Some(NegotiationStatus::parse(raw).ok_or_else(|| {
            ApiError::bad_request(format!("Unknown negotiation status `{raw}`"), &context)
        })?),
        None => None,
    };

    state
        .service
        .list(status, &context)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &context))
}

async fn get_negotiation(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Negotiation>, ApiError> {
    let context = state.context(&headers);
    state
        .service
        .get(NegotiationId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &context))
}

async fn list_product_negotiations(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Negotiation>>, ApiError> {
    let context = state.context(&headers);
    state
        .service
        .list_for_product(ProductId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &context))
}

async fn respond(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<RespondRequest>, JsonRejection>,
) -> Result<Json<Negotiation>, ApiError> {
    let context = state.context(&headers);
    let Json(request) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &context))?;

    state
        .service
        .respond(NegotiationId(id), request.is_accepted, &context)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &context))
}

async fn counter_offer(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    payload: Result<Json<CounterOfferRequest>, JsonRejection>,
) -> Result<Json<Negotiation>, ApiError> {
    let context = state.context(&headers);
    let Json(request) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &context))?;

    state
        .service
        .counter_offer(NegotiationId(id), request.proposed_price, &context)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &context))
}
