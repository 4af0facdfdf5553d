use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tokio::sync::broadcast;

use super::auth::{self, AuthConfig};
use super::db::DbHandle;
use super::extract::{ApiJson, ApiPath, ApiQuery, lenient_id};
use super::jobs::JobFacade;
use super::models::*;
use super::notify::{MessageSender, NotificationStrategyFactory};
use super::payments::PaymentProcessorFactory;
use super::ws::{WsMessage, broadcast_message};
use crate::errors::MarketError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
    pub jobs: JobFacade,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(db: DbHandle, auth: AuthConfig) -> Self {
        let (ws_tx, _) = broadcast::channel::<String>(256);
        Self {
            jobs: JobFacade::new(db.clone(), ws_tx.clone()),
            db,
            ws_tx,
            auth,
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub preferred_notification: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub budget: Option<f64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub client_id: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobActionRequest {
    #[serde(default, deserialize_with = "lenient_id")]
    pub job_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub freelancer_id: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub amount: Option<f64>,
    pub payment_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub job_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub from_user_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub to_user_id: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub recipient: Option<String>,
    pub message: Option<String>,
    pub notification_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRequest {
    #[serde(default, deserialize_with = "lenient_id")]
    pub user_id: Option<i64>,
    pub preferred_notification: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Error handling ────────────────────────────────────────────────────

/// Error half of every handler. `Internal` carries detail for the log only;
/// the client sees a generic message.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (
            status,
            Json(serde_json::json!({"success": false, "message": message})),
        )
            .into_response()
    }
}

impl From<MarketError> for ApiError {
    fn from(err: MarketError) -> Self {
        let message = err.to_string();
        match err {
            e if e.is_not_found() => ApiError::NotFound(message),
            MarketError::EmailTaken { .. }
            | MarketError::AlreadyApplied { .. }
            | MarketError::WrongRole { .. }
            | MarketError::InvalidTransition { .. }
            | MarketError::AssignedElsewhere { .. }
            | MarketError::UnknownPaymentType(_)
            | MarketError::UnknownNotificationType(_)
            | MarketError::Validation(_)
            | MarketError::InvalidResetToken => ApiError::BadRequest(message),
            MarketError::Unauthorized(_) => ApiError::Unauthorized(message),
            MarketError::Other(e) => ApiError::Internal(format!("{e:#}")),
            _ => ApiError::Internal(message),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<MarketError>() {
            Ok(market) => market.into(),
            Err(other) => MarketError::Other(other).into(),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api", get(api_index))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", get(get_user))
        .route("/api/jobs", get(browse_jobs).post(create_job))
        .route("/api/jobs/apply", post(apply_to_job))
        .route("/api/jobs/assign", post(assign_job))
        .route("/api/jobs/complete", post(complete_job))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/applicants", get(get_applicants))
        .route("/api/pay", post(process_payment))
        .route("/api/payments", get(list_payments))
        .route("/api/notify", post(send_notification))
        .route("/api/preference", post(update_preference))
        .nest("/api/auth", auth::auth_router())
        .route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "ok"
}

pub async fn api_index() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Freelancie API Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "/api/auth/register (POST), /api/auth/login (POST), /api/auth/profile (GET, PUT), /api/auth/change-password (PUT), /api/auth/password-reset-request (POST), /api/auth/password-reset (POST), /api/auth/account (DELETE)",
            "payments": "/api/pay (POST), /api/payments (GET)",
            "jobs": "/api/jobs (POST, GET), /api/jobs/{id} (GET), /api/jobs/{id}/applicants (GET), /api/jobs/apply (POST), /api/jobs/assign (POST), /api/jobs/complete (POST)",
            "notifications": "/api/notify (POST), /api/preference (POST)",
            "users": "/api/users (POST, GET), /api/users/{id} (GET)",
            "events": "/ws",
        }
    }))
}

// ── Users ─────────────────────────────────────────────────────────────

async fn create_user(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(name), Some(email), Some(role)) =
        (non_empty(req.name), non_empty(req.email), non_empty(req.role))
    else {
        return Err(ApiError::BadRequest("Name, email, and role are required".into()));
    };
    if !auth::is_valid_email(&email) {
        return Err(ApiError::BadRequest("Please provide a valid email".into()));
    }
    let role: Role = role.parse().map_err(ApiError::BadRequest)?;
    let preferred_notification = match non_empty(req.preferred_notification) {
        Some(name) => name.parse::<NotificationChannel>()?,
        None => NotificationChannel::default(),
    };

    let user = state
        .db
        .call(move |db| {
            db.create_user(&NewUser {
                name: name.trim().to_string(),
                email,
                role,
                preferred_notification,
                password_hash: None,
            })
        })
        .await?;
    tracing::info!(user_id = user.id, role = user.role.as_str(), "user created");
    broadcast_message(&state.ws_tx, &WsMessage::UserCreated { user: user.clone() });

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "User created successfully",
            "user": user,
        })),
    ))
}

async fn list_users(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.call(|db| db.list_users()).await?;
    Ok(Json(serde_json::json!({"success": true, "users": users})))
}

async fn get_user(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.db.call(move |db| db.require_user(id)).await?;
    Ok(Json(serde_json::json!({"success": true, "user": user})))
}

// ── Jobs ──────────────────────────────────────────────────────────────

async fn create_job(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(title), Some(description), Some(budget), Some(client_id)) = (
        non_empty(req.title),
        non_empty(req.description),
        req.budget,
        req.client_id,
    ) else {
        return Err(ApiError::BadRequest("All fields are required".into()));
    };
    let result = state
        .jobs
        .create_job(title, description, budget, client_id)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn browse_jobs(
    State(state): State<SharedState>,
    ApiQuery(criteria): ApiQuery<JobCriteria>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.jobs.browse_jobs(criteria).await?))
}

async fn get_job(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.jobs.job_details(id).await?;
    Ok(Json(serde_json::json!({"success": true, "job": job})))
}

async fn get_applicants(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let applicants = state.jobs.applicants(id).await?;
    Ok(Json(serde_json::json!({"success": true, "applicants": applicants})))
}

fn job_action_ids(req: JobActionRequest) -> Result<(i64, i64), ApiError> {
    match (req.job_id, req.freelancer_id) {
        (Some(job_id), Some(freelancer_id)) => Ok((job_id, freelancer_id)),
        _ => Err(ApiError::BadRequest(
            "Job ID and Freelancer ID are required".into(),
        )),
    }
}

async fn apply_to_job(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<JobActionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (job_id, freelancer_id) = job_action_ids(req)?;
    Ok(Json(state.jobs.apply_to_job(job_id, freelancer_id).await?))
}

async fn assign_job(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<JobActionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (job_id, freelancer_id) = job_action_ids(req)?;
    Ok(Json(
        state
            .jobs
            .assign_job_to_freelancer(job_id, freelancer_id)
            .await?,
    ))
}

async fn complete_job(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<JobActionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (job_id, freelancer_id) = job_action_ids(req)?;
    Ok(Json(state.jobs.complete_job(job_id, freelancer_id).await?))
}

// ── Payments ──────────────────────────────────────────────────────────

async fn process_payment(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<PaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(amount), Some(payment_type)) = (req.amount, non_empty(req.payment_type)) else {
        return Err(ApiError::BadRequest(
            "Amount and payment type are required".into(),
        ));
    };
    if !(amount.is_finite() && amount > 0.0) {
        return Err(ApiError::BadRequest("Amount must be a positive number".into()));
    }

    let processor = PaymentProcessorFactory::from_name(&payment_type)?;
    let receipt = processor.process(amount);

    let new = NewPayment {
        amount,
        payment_type: receipt.payment_type,
        status: PaymentStatus::Completed,
        job_id: req.job_id,
        from_user_id: req.from_user_id,
        to_user_id: req.to_user_id,
        transaction_id: receipt.transaction_id.clone(),
    };
    let payment = state.db.call(move |db| db.create_payment(&new)).await?;
    tracing::info!(
        payment_id = payment.id,
        payment_type = payment.payment_type.as_str(),
        amount,
        transaction_id = %receipt.transaction_id,
        "payment processed"
    );
    broadcast_message(
        &state.ws_tx,
        &WsMessage::PaymentProcessed {
            payment: payment.clone(),
        },
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "message": receipt.message,
        "transactionId": receipt.transaction_id,
        "payment": payment,
    })))
}

async fn list_payments(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let payments = state.db.call(|db| db.list_payments()).await?;
    Ok(Json(serde_json::json!({"success": true, "payments": payments})))
}

// ── Notifications ─────────────────────────────────────────────────────

async fn send_notification(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<NotifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(recipient), Some(message), Some(kind)) = (
        non_empty(req.recipient),
        non_empty(req.message),
        non_empty(req.notification_type),
    ) else {
        return Err(ApiError::BadRequest(
            "Recipient, message, and notification type are required".into(),
        ));
    };

    let strategy = NotificationStrategyFactory::from_name(&kind, &state.ws_tx)?;
    let sender = MessageSender::new(strategy);
    let details = sender.send(&recipient, &message).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Notification sent successfully",
        "details": details,
    })))
}

async fn update_preference(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<PreferenceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(user_id), Some(preferred)) = (req.user_id, non_empty(req.preferred_notification))
    else {
        return Err(ApiError::BadRequest(
            "User ID and preferred notification type are required".into(),
        ));
    };
    let channel: NotificationChannel = preferred.parse()?;

    let user = state
        .db
        .call(move |db| db.set_preferred_notification(user_id, channel))
        .await?
        .ok_or(MarketError::UserNotFound { id: user_id })?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Notification preference updated",
        "user": user,
    })))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::auth::fast_auth_config;
    use crate::market::db::MarketDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let db = DbHandle::new(MarketDb::new_in_memory().unwrap());
        Arc::new(AppState::new(db, fast_auth_config()))
    }

    async fn call(
        state: &SharedState,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = api_router()
            .with_state(state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    async fn create_user(state: &SharedState, email: &str, role: &str) -> i64 {
        let (status, body) = call(
            state,
            "POST",
            "/api/users",
            Some(serde_json::json!({"name": "Someone", "email": email, "role": role})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["user"]["id"].as_i64().unwrap()
    }

    async fn create_job(state: &SharedState, client_id: i64, budget: f64) -> i64 {
        let (status, body) = call(
            state,
            "POST",
            "/api/jobs",
            Some(serde_json::json!({
                "title": "Build API",
                "description": "REST backend",
                "budget": budget,
                "clientId": client_id,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["job"]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = test_state();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = api_router().with_state(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_api_index() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/api", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["endpoints"]["jobs"].as_str().unwrap().contains("/api/jobs/apply"));
    }

    #[tokio::test]
    async fn test_user_crud() {
        let state = test_state();
        let mut rx = state.ws_tx.subscribe();
        let id = create_user(&state, "Ann@Example.com", "freelancer").await;

        let (status, body) = call(&state, "GET", &format!("/api/users/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "ann@example.com");
        assert_eq!(body["user"]["preferredNotification"], "email");

        let (_, body) = call(&state, "GET", "/api/users", None).await;
        assert_eq!(body["users"].as_array().unwrap().len(), 1);

        let (status, body) = call(&state, "GET", "/api/users/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, serde_json::json!({"success": false, "message": "User not found"}));

        let raw = rx.try_recv().unwrap();
        assert!(raw.contains("\"type\":\"UserCreated\""));
    }

    #[tokio::test]
    async fn test_create_user_validation() {
        let state = test_state();
        let (status, body) = call(
            &state,
            "POST",
            "/api/users",
            Some(serde_json::json!({"name": "No Role", "email": "x@example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Name, email, and role are required");

        create_user(&state, "dup@example.com", "client").await;
        let (status, body) = call(
            &state,
            "POST",
            "/api/users",
            Some(serde_json::json!({"name": "Dup", "email": "DUP@example.com", "role": "client"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already exists");

        let (status, body) = call(
            &state,
            "POST",
            "/api/users",
            Some(serde_json::json!({
                "name": "Fax", "email": "fax@example.com", "role": "client",
                "preferredNotification": "fax"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Unknown notification type: fax");
    }

    #[tokio::test]
    async fn test_job_lifecycle_over_http() {
        let state = test_state();
        let client = create_user(&state, "client@example.com", "client").await;
        let freelancer = create_user(&state, "free@example.com", "freelancer").await;
        let job = create_job(&state, client, 500.0).await;
        let action = serde_json::json!({"jobId": job, "freelancerId": freelancer});

        let (status, body) = call(&state, "POST", "/api/jobs/apply", Some(action.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Application submitted successfully");

        let (status, body) = call(&state, "POST", "/api/jobs/apply", Some(action.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Already applied to this job");

        let (_, body) = call(&state, "GET", &format!("/api/jobs/{job}/applicants"), None).await;
        assert_eq!(body["applicants"][0]["freelancer"]["id"], freelancer);

        let (status, body) = call(&state, "POST", "/api/jobs/assign", Some(action.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job"]["status"], "in-progress");
        assert_eq!(body["job"]["assignedTo"], freelancer);

        let (status, body) = call(&state, "POST", "/api/jobs/complete", Some(action)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job"]["status"], "completed");

        let (status, body) = call(&state, "GET", &format!("/api/jobs/{job}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job"]["client"]["email"], "client@example.com");
    }

    #[tokio::test]
    async fn test_job_validation() {
        let state = test_state();
        let (status, body) = call(
            &state,
            "POST",
            "/api/jobs",
            Some(serde_json::json!({"title": "Only title"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "All fields are required");

        let (status, body) = call(
            &state,
            "POST",
            "/api/jobs/apply",
            Some(serde_json::json!({"jobId": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Job ID and Freelancer ID are required");

        let (status, body) = call(&state, "GET", "/api/jobs/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Job not found");
    }

    #[tokio::test]
    async fn test_browse_jobs_filters() {
        let state = test_state();
        let client = create_user(&state, "client@example.com", "client").await;
        let freelancer = create_user(&state, "free@example.com", "freelancer").await;
        let cheap = create_job(&state, client, 50.0).await;
        create_job(&state, client, 5000.0).await;
        call(
            &state,
            "POST",
            "/api/jobs/assign",
            Some(serde_json::json!({"jobId": cheap, "freelancerId": freelancer})),
        )
        .await;

        let (_, body) = call(&state, "GET", "/api/jobs", None).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["jobs"].as_array().unwrap().len(), 2);

        let (_, body) = call(&state, "GET", "/api/jobs?minBudget=1000", None).await;
        assert_eq!(body["jobs"].as_array().unwrap().len(), 1);

        let (_, body) = call(&state, "GET", "/api/jobs?status=in-progress", None).await;
        let jobs = body["jobs"].as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["id"], cheap);
    }

    #[tokio::test]
    async fn test_process_payment() {
        let state = test_state();
        let client = create_user(&state, "client@example.com", "client").await;
        let freelancer = create_user(&state, "free@example.com", "freelancer").await;
        let job = create_job(&state, client, 100.0).await;

        let (status, body) = call(
            &state,
            "POST",
            "/api/pay",
            Some(serde_json::json!({
                "amount": 100,
                "paymentType": "PayPal",
                "jobId": job,
                "fromUserId": client,
                "toUserId": freelancer,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["message"], "PayPal payment of $100 processed successfully");
        assert!(body["transactionId"].as_str().unwrap().starts_with("PP-"));
        assert_eq!(body["payment"]["status"], "completed");
        assert_eq!(body["payment"]["paymentType"], "paypal");

        let (_, body) = call(&state, "GET", "/api/payments", None).await;
        let payments = body["payments"].as_array().unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0]["job"]["title"], "Build API");
        assert_eq!(payments[0]["toUser"]["email"], "free@example.com");
    }

    #[tokio::test]
    async fn test_payment_errors() {
        let state = test_state();
        let (status, body) = call(
            &state,
            "POST",
            "/api/pay",
            Some(serde_json::json!({"amount": 10})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Amount and payment type are required");

        let (status, body) = call(
            &state,
            "POST",
            "/api/pay",
            Some(serde_json::json!({"amount": 10, "paymentType": "cheque"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Unknown payment type: cheque");

        let (status, _) = call(
            &state,
            "POST",
            "/api/pay",
            Some(serde_json::json!({"amount": -5, "paymentType": "crypto"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &state,
            "POST",
            "/api/pay",
            Some(serde_json::json!({"amount": 5, "paymentType": "crypto", "jobId": 77})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Job not found");
    }

    #[tokio::test]
    async fn test_send_notification() {
        let state = test_state();
        let (status, body) = call(
            &state,
            "POST",
            "/api/notify",
            Some(serde_json::json!({
                "recipient": "user@example.com",
                "message": "Test notification message",
                "notificationType": "sms",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Notification sent successfully");
        assert_eq!(body["details"]["method"], "sms");
        assert_eq!(body["details"]["recipient"], "user@example.com");

        let (status, body) = call(
            &state,
            "POST",
            "/api/notify",
            Some(serde_json::json!({"recipient": "a", "message": "b"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Recipient, message, and notification type are required"
        );

        let (status, _) = call(
            &state,
            "POST",
            "/api/notify",
            Some(serde_json::json!({"recipient": "a", "message": "b", "notificationType": "pigeon"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_preference() {
        let state = test_state();
        let id = create_user(&state, "pref@example.com", "freelancer").await;

        let (status, body) = call(
            &state,
            "POST",
            "/api/preference",
            Some(serde_json::json!({"userId": id, "preferredNotification": "push"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Notification preference updated");
        assert_eq!(body["user"]["preferredNotification"], "push");

        let (status, _) = call(
            &state,
            "POST",
            "/api/preference",
            Some(serde_json::json!({"userId": 999, "preferredNotification": "push"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &state,
            "POST",
            "/api/preference",
            Some(serde_json::json!({"userId": id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_mapping() {
        let cases = [
            (ApiError::from(MarketError::JobNotFound { id: 1 }), StatusCode::NOT_FOUND),
            (ApiError::from(MarketError::invalid("bad")), StatusCode::BAD_REQUEST),
            (
                ApiError::from(MarketError::Unauthorized("nope".into())),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::from(anyhow::anyhow!("disk on fire")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_internal_error_hides_detail() {
        let err = ApiError::from(anyhow::anyhow!("no such table: users").context("listing users"));
        assert!(matches!(&err, ApiError::Internal(detail) if detail.contains("no such table")));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Internal server error");
        assert!(!body.to_string().contains("no such table"));
    }

    #[tokio::test]
    async fn test_malformed_requests_get_json_errors() {
        let state = test_state();
        let raw = |method: &str, uri: &str, body: &'static str| {
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap()
        };
        let requests = [
            raw("POST", "/api/users", "{not json"),
            raw("POST", "/api/jobs/apply", r#"{"jobId": 1, "freelancerId": "abc"}"#),
            raw("POST", "/api/pay", r#"{"amount": "lots", "paymentType": "paypal"}"#),
            raw("GET", "/api/users/abc", ""),
            raw("GET", "/api/jobs?status=archived", ""),
            Request::builder()
                .method("POST")
                .uri("/api/users")
                .body(Body::from("name=x"))
                .unwrap(),
        ];
        for request in requests {
            let uri = request.uri().clone();
            let response = api_router()
                .with_state(state.clone())
                .oneshot(request)
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body: serde_json::Value = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| panic!("{uri} returned a non-JSON body"));
            assert_eq!(body["success"], false, "{uri}");
            assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_ids_accepted_as_numeric_strings() {
        let state = test_state();
        let client = create_user(&state, "client@example.com", "client").await;
        let freelancer = create_user(&state, "free@example.com", "freelancer").await;
        let job = create_job(&state, client, 250.0).await;

        let (status, body) = call(
            &state,
            "POST",
            "/api/jobs/apply",
            Some(serde_json::json!({
                "jobId": job.to_string(),
                "freelancerId": freelancer.to_string(),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["job"]["applicants"][0]["freelancerId"], freelancer);

        let (status, body) = call(
            &state,
            "POST",
            "/api/jobs/apply",
            Some(serde_json::json!({"jobId": job, "freelancerId": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Job ID and Freelancer ID are required");
    }

    #[test]
    fn test_anyhow_downcast_keeps_status() {
        let err: anyhow::Error = MarketError::AlreadyApplied {
            job_id: 1,
            freelancer_id: 2,
        }
        .into();
        let err = ApiError::from(err.context("while applying"));
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "Already applied to this job"));
    }
}
