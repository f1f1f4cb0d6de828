use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::identity::{IdentityError, IdentityProvider};
use crate::mailer::Mailer;
use crate::store::OtpStore;
use crate::types::{EmailAddr, Purpose};

#[derive(Debug, Clone)]
pub struct AppState<M, I> {
    pub store: OtpStore,
    pub mailer: M,
    pub identity: I,
}

#[derive(Debug, Serialize)]
struct FailureBody {
    success: bool,
    message: String,
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let body = FailureBody {
        success: false,
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
struct SendOtpRequest {
    #[serde(default)]
    email: String,

    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendOtpResponse {
    success: bool,
    message: String,
    #[serde(rename = "type")]
    purpose: Purpose,
}

async fn send_otp_handler<M: Mailer, I: IdentityProvider>(
    State(state): State<AppState<M, I>>,
    Json(request): Json<SendOtpRequest>,
) -> Response {
    if request.email.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Email is required");
    }

    let purpose = Purpose::from_request(request.kind.as_deref());
    let email = EmailAddr::new(&request.email);

    let code = state.store.issue(&email, purpose).await;
    debug!(email = %email, purpose = %purpose, code = %code, "issued challenge");

    // A failed send intentionally leaves the challenge in place; the code
    // stays valid until its TTL runs out or a re-request supersedes it.
    if let Err(e) = state.mailer.send_challenge(&email, purpose, &code).await {
        error!(email = %email, error = %e, "failed to deliver challenge email");
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send OTP");
    }

    info!(email = %email, purpose = %purpose, "challenge sent");

    Json(SendOtpResponse {
        success: true,
        message: format!("OTP sent successfully for {purpose}"),
        purpose,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct VerifyOtpRequest {
    #[serde(default)]
    email: String,

    #[serde(default)]
    otp: String,
}

#[derive(Debug, Serialize)]
struct AckResponse {
    success: bool,
    message: String,
}

async fn verify_otp_handler<M: Mailer, I: IdentityProvider>(
    State(state): State<AppState<M, I>>,
    Json(request): Json<VerifyOtpRequest>,
) -> Response {
    if request.email.trim().is_empty() || request.otp.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Email and OTP are required");
    }

    let email = EmailAddr::new(&request.email);

    match state.store.verify(&email, request.otp.trim()).await {
        Ok(()) => {
            info!(email = %email, "challenge verified");
            Json(AckResponse {
                success: true,
                message: "OTP verified successfully".to_owned(),
            })
            .into_response()
        }
        Err(e) => {
            debug!(email = %email, outcome = %e, "verification rejected");
            failure(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResetPasswordRequest {
    #[serde(default)]
    email: String,

    #[serde(rename = "newPassword", default)]
    new_password: String,
}

async fn reset_password_handler<M: Mailer, I: IdentityProvider>(
    State(state): State<AppState<M, I>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Response {
    if request.email.trim().is_empty() || request.new_password.is_empty() {
        return failure(
            StatusCode::BAD_REQUEST,
            "Email and new password are required",
        );
    }

    // Input validation happens before the ticket is touched, so a policy
    // rejection doesn't burn the single-use verification.
    if request.new_password.chars().count() < 6 {
        return failure(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters long",
        );
    }

    let email = EmailAddr::new(&request.email);

    if let Err(e) = state.store.consume(&email).await {
        debug!(email = %email, outcome = %e, "reset rejected");
        return failure(StatusCode::BAD_REQUEST, e.to_string());
    }

    // The ticket is gone at this point regardless of what the provider
    // says; a failed update means the user re-verifies.
    match state
        .identity
        .set_password(&email, &request.new_password)
        .await
    {
        Ok(()) => {
            info!(email = %email, "password reset complete");
            Json(AckResponse {
                success: true,
                message: "Password reset successfully".to_owned(),
            })
            .into_response()
        }
        Err(IdentityError::UserNotFound) => failure(StatusCode::NOT_FOUND, "User not found"),
        Err(IdentityError::Provider(message)) => {
            error!(email = %email, error = %message, "identity provider rejected update");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to reset password",
            )
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    timestamp: String,
    endpoints: EndpointCatalog,
}

#[derive(Debug, Serialize)]
struct EndpointCatalog {
    #[serde(rename = "sendOTP")]
    send_otp: &'static str,
    #[serde(rename = "verifyOTP")]
    verify_otp: &'static str,
    #[serde(rename = "resetPassword")]
    reset_password: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        message: "OTP service is running",
        timestamp: jiff::Timestamp::now().to_string(),
        endpoints: EndpointCatalog {
            send_otp: "POST /send-otp (with type: \"registration\" or \"reset\")",
            verify_otp: "POST /verify-otp",
            reset_password: "POST /reset-password",
        },
    })
}

pub fn create_router<M: Mailer, I: IdentityProvider>(
    store: OtpStore,
    mailer: M,
    identity: I,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState {
        store,
        mailer,
        identity,
    };

    Router::new()
        .route("/send-otp", post(send_otp_handler::<M, I>))
        .route("/verify-otp", post(verify_otp_handler::<M, I>))
        .route("/reset-password", post(reset_password_handler::<M, I>))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(cors)
}
