//! Registration, login, refresh, logout and account handlers.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use sentinel_core::auth::tokens::seconds_until;
use sentinel_core::models::auth::{ClientInfo, LoginOutcome};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    LoginRequest, LoginResponse, MeResponse, RefreshRequest, RefreshResponse, RegisterRequest,
    RegisterResponse, SuccessResponse, VerifyEmailRequest,
};

const TOKEN_TYPE: &str = "Bearer";

/// Client address and user agent of the caller.
///
/// The address is the first `X-Forwarded-For` hop when the server is
/// configured to trust a fronting proxy, else the socket peer when the
/// server was started with connect info.
pub struct Client(pub ClientInfo);

impl FromRequestParts<AppState> for Client {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let forwarded = if state.config.trust_forwarded_for {
            forwarded_for(parts)
        } else {
            None
        };
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Client(ClientInfo {
            ip_address: forwarded.or(peer),
            user_agent,
        }))
    }
}

fn forwarded_for(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `POST /auth/register`: create an account.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let user = state
        .auth
        .register(&body.username, body.email.as_deref(), &body.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            message: format!("Welcome, {}", user.username),
            username: user.username,
        }),
    ))
}

/// `POST /auth/verify-email`: confirm an email address.
pub async fn verify_email_handler(
    State(state): State<AppState>,
    Json(body): Json<VerifyEmailRequest>,
) -> AppResult<Json<SuccessResponse>> {
    state.auth.confirm_email(&body.token).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// `POST /auth/login`: password login, with a TOTP code when enrolled.
pub async fn login_handler(
    State(state): State<AppState>,
    Client(client): Client,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let outcome = state
        .auth
        .login(
            &body.identifier,
            &body.password,
            body.mfa_code.as_deref(),
            &client,
        )
        .await?;
    let resp = match outcome {
        LoginOutcome::MfaRequired => LoginResponse {
            require_mfa: true,
            ..Default::default()
        },
        LoginOutcome::Authenticated(pair) => LoginResponse {
            require_mfa: false,
            expires_in: Some(seconds_until(pair.access_expires_at)),
            access_token: Some(pair.access_token),
            refresh_token: Some(pair.refresh_token),
            token_type: Some(TOKEN_TYPE.into()),
        },
    };
    Ok(Json(resp))
}

/// `POST /auth/refresh`: mint a new access token.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Client(client): Client,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    let access = state.auth.refresh(&body.refresh_token, &client).await?;
    Ok(Json(RefreshResponse {
        expires_in: seconds_until(access.expires_at),
        access_token: access.token,
        token_type: TOKEN_TYPE.into(),
    }))
}

/// `POST /auth/logout`: blacklist the bearer token and end its session.
pub async fn logout_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<SuccessResponse>> {
    state
        .auth
        .logout(&user.principal, &user.access_token)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

/// `GET /auth/me`: the caller's account.
pub async fn me_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<MeResponse>> {
    let profile = state.auth.profile(user.principal.user_id).await?;
    Ok(Json(profile.into()))
}
