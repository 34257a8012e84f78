//! # REST API
//!
//! The axum router over the in-process network. Every node is addressed by
//! its legal name; flows run on the named node.
//!
//! ## Endpoints
//!
//! | Method | Path                               | Description                     |
//! |--------|------------------------------------|---------------------------------|
//! | GET    | `/health`                          | Liveness check                  |
//! | GET    | `/nodes`                           | Parties on the network          |
//! | GET    | `/nodes/:name/ious`                | Unconsumed IOUs in a vault      |
//! | POST   | `/nodes/:name/ious`                | Issue an IOU                    |
//! | POST   | `/nodes/:name/ious/:id/transfer`   | Transfer an IOU to a new lender |
//! | POST   | `/nodes/:name/ious/:id/settle`     | Settle (part of) an IOU         |
//! | POST   | `/nodes/:name/cash`                | Self-issue cash                 |
//! | GET    | `/nodes/:name/cash/:currency`      | Cash balance                    |
//!
//! Amounts travel as strings such as `"40.00 USD"`. Flow failures come back
//! as `{ "error": ..., "kind": ... }` with the flow's error text verbatim.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use iou_protocol::{Amount, Currency, IouState, SignedTransaction, StateAndRef, UniqueIdentifier};

use crate::flow::FlowError;
use crate::metrics::SharedMetrics;
use crate::node::{Network, Node};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub network: Arc<Network>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Build the API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/nodes", get(nodes_handler))
        .route("/nodes/:name/ious", get(list_ious_handler).post(issue_handler))
        .route("/nodes/:name/ious/:id/transfer", post(transfer_handler))
        .route("/nodes/:name/ious/:id/settle", post(settle_handler))
        .route("/nodes/:name/cash", post(self_issue_handler))
        .route("/nodes/:name/cash/:currency", get(balance_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    pub amount: String,
    pub lender: String,
    pub borrower: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub new_lender: String,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartyResponse {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IouResponse {
    pub linear_id: String,
    pub amount: String,
    pub paid: String,
    pub outstanding: String,
    pub lender: String,
    pub borrower: String,
    pub state_ref: Option<String>,
}

impl IouResponse {
    fn from_state(iou: &IouState, state_ref: Option<String>) -> Self {
        let outstanding = iou
            .outstanding()
            .map(|a| a.to_string())
            .unwrap_or_else(|e| format!("<{e}>"));
        Self {
            linear_id: iou.linear_id.id.to_string(),
            amount: iou.amount.to_string(),
            paid: iou.paid.to_string(),
            outstanding,
            lender: iou.lender.name.clone(),
            borrower: iou.borrower.name.clone(),
            state_ref,
        }
    }

    fn from_state_and_ref(s: &StateAndRef) -> Option<Self> {
        s.iou()
            .map(|iou| Self::from_state(iou, Some(s.reference.to_string())))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub tx_id: String,
    pub inputs: usize,
    pub outputs: usize,
    pub signers: usize,
    /// IOU outputs of the transaction, if any.
    pub ious: Vec<IouResponse>,
}

impl From<&SignedTransaction> for TransactionResponse {
    fn from(stx: &SignedTransaction) -> Self {
        Self {
            tx_id: stx.id().to_hex(),
            inputs: stx.tx.inputs.len(),
            outputs: stx.tx.outputs.len(),
            signers: stx.sigs.len(),
            ious: stx
                .tx
                .out_refs()
                .iter()
                .filter_map(IouResponse::from_state_and_ref)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CashResponse {
    pub amount: String,
    pub owner: String,
    pub issuer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub currency: String,
    pub balance: String,
    pub quantity: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    UnknownNode(String),
    Flow(FlowError),
}

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        ApiError::Flow(e)
    }
}

fn flow_status(e: &FlowError) -> (StatusCode, &'static str) {
    match e {
        FlowError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        FlowError::UnknownParty(_) => (StatusCode::NOT_FOUND, "unknown_party"),
        FlowError::UnauthorizedInitiator { .. } => (StatusCode::FORBIDDEN, "unauthorized_initiator"),
        FlowError::InsufficientFunds { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_funds"),
        FlowError::OverSettlement { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "over_settlement"),
        FlowError::CurrencyMismatch { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "currency_mismatch"),
        FlowError::Contract(_) => (StatusCode::UNPROCESSABLE_ENTITY, "contract_violation"),
        FlowError::Amount(_) | FlowError::InvalidRequest(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request")
        }
        FlowError::CounterpartyRejected { .. } => (StatusCode::CONFLICT, "counterparty_rejected"),
        FlowError::CommitConflict { .. } => (StatusCode::CONFLICT, "commit_conflict"),
        FlowError::Session(_) => (StatusCode::GATEWAY_TIMEOUT, "session"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::UnknownNode(name) => (
                StatusCode::NOT_FOUND,
                "unknown_node",
                format!("no node named {name}"),
            ),
            ApiError::Flow(e) => {
                let (status, kind) = flow_status(&e);
                if status.is_server_error() {
                    tracing::error!(error = %e, "flow failed");
                }
                (status, kind, e.to_string())
            }
        };
        (
            status,
            Json(ErrorResponse {
                error,
                kind: kind.to_string(),
            }),
        )
            .into_response()
    }
}

fn node(state: &AppState, name: &str) -> Result<Arc<Node>, ApiError> {
    state
        .network
        .node(name)
        .ok_or_else(|| ApiError::UnknownNode(name.to_string()))
}

fn parse_amount(s: &str) -> Result<Amount, ApiError> {
    Amount::from_str(s).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn parse_linear_id(s: &str) -> Result<UniqueIdentifier, ApiError> {
    UniqueIdentifier::from_str(s).map_err(|e| ApiError::BadRequest(format!("bad linear id: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "version": state.version })),
    )
}

/// `GET /nodes`
async fn nodes_handler(State(state): State<AppState>) -> Json<Vec<PartyResponse>> {
    Json(
        state
            .network
            .parties()
            .into_iter()
            .map(|p| PartyResponse {
                key: p.owning_key.to_hex(),
                name: p.name,
            })
            .collect(),
    )
}

/// `GET /nodes/:name/ious`
async fn list_ious_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<IouResponse>>, ApiError> {
    let node = node(&state, &name)?;
    Ok(Json(
        node.ious()
            .iter()
            .filter_map(IouResponse::from_state_and_ref)
            .collect(),
    ))
}

/// `POST /nodes/:name/ious`
async fn issue_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<IssueRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let node = node(&state, &name)?;
    let amount = parse_amount(&req.amount)?;
    let lender = state.network.party(&req.lender)?;
    let borrower = state.network.party(&req.borrower)?;
    let stx = node.issue_iou(IouState::new(amount, lender, borrower)).await?;
    Ok((StatusCode::CREATED, Json(TransactionResponse::from(&stx))))
}

/// `POST /nodes/:name/ious/:id/transfer`
async fn transfer_handler(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let node = node(&state, &name)?;
    let linear_id = parse_linear_id(&id)?;
    let new_lender = state.network.party(&req.new_lender)?;
    let stx = node.transfer_iou(linear_id, new_lender).await?;
    Ok(Json(TransactionResponse::from(&stx)))
}

/// `POST /nodes/:name/ious/:id/settle`
async fn settle_handler(
    State(state): State<AppState>,
    Path((name, id)): Path<(String, String)>,
    Json(req): Json<AmountRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let node = node(&state, &name)?;
    let linear_id = parse_linear_id(&id)?;
    let amount = parse_amount(&req.amount)?;
    let stx = node.settle_iou(linear_id, amount).await?;
    Ok(Json(TransactionResponse::from(&stx)))
}

/// `POST /nodes/:name/cash`
async fn self_issue_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<AmountRequest>,
) -> Result<(StatusCode, Json<CashResponse>), ApiError> {
    let node = node(&state, &name)?;
    let amount = parse_amount(&req.amount)?;
    let cash = node.self_issue_cash(amount).await?;
    Ok((
        StatusCode::CREATED,
        Json(CashResponse {
            amount: cash.amount.to_string(),
            owner: cash.owner.to_string(),
            issuer: cash.issuer.party.name.clone(),
        }),
    ))
}

/// `GET /nodes/:name/cash/:currency`
async fn balance_handler(
    State(state): State<AppState>,
    Path((name, currency)): Path<(String, String)>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let node = node(&state, &name)?;
    let currency = Currency::from_str(&currency).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let balance = node
        .vault()
        .cash_balance(&currency)
        .map_err(|e| ApiError::Flow(e.into()))?;
    Ok(Json(BalanceResponse {
        currency: currency.to_string(),
        balance: balance.to_string(),
        quantity: balance.quantity,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::metrics::NodeMetrics;

    fn test_state() -> AppState {
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let network = Arc::new(Network::new(metrics.clone()));
        network.add_node("Lender").unwrap();
        network.add_node("Borrower").unwrap();
        AppState {
            version: "0.1.0-test".into(),
            network,
            metrics,
        }
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let router = create_router(test_state());
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn lists_nodes_by_name() {
        let router = create_router(test_state());
        let (status, body) = get(&router, "/nodes").await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Borrower", "Lender"]);
    }

    #[tokio::test]
    async fn unknown_node_is_404() {
        let router = create_router(test_state());
        let (status, body) = get(&router, "/nodes/Nobody/ious").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "unknown_node");
    }

    #[tokio::test]
    async fn issue_settle_and_query_over_http() {
        let router = create_router(test_state());

        let (status, body) = post_json(
            &router,
            "/nodes/Borrower/ious",
            serde_json::json!({ "amount": "100.00 USD", "lender": "Lender", "borrower": "Borrower" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let linear_id = body["ious"][0]["linear_id"].as_str().unwrap().to_string();

        let (status, _) = post_json(
            &router,
            "/nodes/Borrower/cash",
            serde_json::json!({ "amount": "50.00 USD" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = post_json(
            &router,
            &format!("/nodes/Borrower/ious/{linear_id}/settle"),
            serde_json::json!({ "amount": "40.00 USD" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["ious"][0]["paid"], "40.00 USD");

        let (_, ious) = get(&router, "/nodes/Lender/ious").await;
        assert_eq!(ious[0]["outstanding"], "60.00 USD");

        let (_, balance) = get(&router, "/nodes/Lender/cash/USD").await;
        assert_eq!(balance["quantity"], 4_000);
        let (_, balance) = get(&router, "/nodes/Borrower/cash/USD").await;
        assert_eq!(balance["balance"], "10.00 USD");
    }

    #[tokio::test]
    async fn over_settlement_maps_to_422() {
        let router = create_router(test_state());
        let (_, body) = post_json(
            &router,
            "/nodes/Lender/ious",
            serde_json::json!({ "amount": "10.00 USD", "lender": "Lender", "borrower": "Borrower" }),
        )
        .await;
        let linear_id = body["ious"][0]["linear_id"].as_str().unwrap().to_string();
        post_json(
            &router,
            "/nodes/Borrower/cash",
            serde_json::json!({ "amount": "50.00 USD" }),
        )
        .await;

        let (status, body) = post_json(
            &router,
            &format!("/nodes/Borrower/ious/{linear_id}/settle"),
            serde_json::json!({ "amount": "20.00 USD" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "over_settlement");
    }

    #[tokio::test]
    async fn malformed_amount_is_400() {
        let router = create_router(test_state());
        let (status, body) = post_json(
            &router,
            "/nodes/Borrower/cash",
            serde_json::json!({ "amount": "lots" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "bad_request");
    }
}
