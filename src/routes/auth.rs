use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser, CurrentWorker},
    error::{AppError, AppResult},
    models::{NewRefreshToken, User},
    response::{ok, ApiJson},
    routes::admin::WorkerView,
    schema::{refresh_tokens, users, workers},
    state::AppState,
};

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub role: Option<String>,
}

fn issue_tokens(
    state: &AppState,
    conn: &mut PgConnection,
    user: &User,
) -> AppResult<(HeaderMap, ApiJson<LoginResponse>)> {
    let role: Option<String> = workers::table
        .filter(workers::user_id.eq(user.id))
        .select(workers::role)
        .first(conn)
        .optional()?;

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, role.as_deref())
        .map_err(AppError::from)?;

    let now = Utc::now();
    let refresh_value = generate_refresh_token();
    let refresh_expires_at = now + ChronoDuration::days(state.config.refresh_token_expiry_days);

    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: hash_refresh_token(&refresh_value),
            issued_at: now.naive_utc(),
            expires_at: refresh_expires_at.naive_utc(),
        })
        .execute(conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_refresh_cookie(state, &refresh_value, refresh_expires_at)?,
    );

    Ok((
        headers,
        ok(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
            role,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<LoginRequest>,
) -> AppResult<(HeaderMap, ApiJson<LoginResponse>)> {
    let mut conn = state.db()?;
    let email = payload.email.trim().to_lowercase();

    let user: User = users::table
        .filter(users::email.eq(&email))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        tracing::warn!(user_id = %user.id, "rejected login with wrong password");
        return Err(AppError::unauthorized());
    }

    tracing::info!(user_id = %user.id, "user logged in");
    issue_tokens(&state, &mut conn, &user)
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, ApiJson<LoginResponse>)> {
    let cookies = jar.ok_or_else(AppError::unauthorized)?;
    let refresh_value = cookies
        .get(REFRESH_COOKIE_NAME)
        .ok_or_else(AppError::unauthorized)?;

    let hashed = hash_refresh_token(refresh_value);
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();

    // Revoking with `revoked_at IS NULL` lets only one of two concurrent
    // refreshes with the same cookie through.
    conn.transaction::<_, AppError, _>(|conn| {
        let user_id: Uuid = diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::token_hash.eq(&hashed))
                .filter(refresh_tokens::revoked_at.is_null())
                .filter(refresh_tokens::expires_at.gt(now)),
        )
        .set((
            refresh_tokens::revoked_at.eq(now),
            refresh_tokens::updated_at.eq(now),
        ))
        .returning(refresh_tokens::user_id)
        .get_result(conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

        let user: User = users::table.find(user_id).first(conn)?;
        issue_tokens(&state, conn, &user)
    })
}

pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, ApiJson<serde_json::Value>)> {
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();
    let mut revoked = 0;

    if let Some(value) = jar.as_ref().and_then(|c| c.get(REFRESH_COOKIE_NAME)) {
        revoked = diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::token_hash.eq(hash_refresh_token(value)))
                .filter(refresh_tokens::user_id.eq(user.user_id))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set((
            refresh_tokens::revoked_at.eq(now),
            refresh_tokens::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    }

    if revoked == 0 {
        diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::user_id.eq(user.user_id))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set((
            refresh_tokens::revoked_at.eq(now),
            refresh_tokens::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    }

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_refresh_cookie(&state)?);
    Ok((headers, ok(serde_json::json!({ "logged_out": true }))))
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub email: String,
    pub worker: WorkerView,
}

pub async fn me(current: CurrentWorker) -> ApiJson<MeResponse> {
    ok(MeResponse {
        user_id: current.user.user_id,
        email: current.user.email.clone(),
        worker: WorkerView::from(current.worker),
    })
}

fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn cookie_attributes(state: &AppState, parts: &mut Vec<String>) {
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    if state.config.refresh_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={domain}"));
    }
}

fn build_refresh_cookie(
    state: &AppState,
    token: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<HeaderValue> {
    let max_age = ChronoDuration::days(state.config.refresh_token_expiry_days).num_seconds();
    let mut parts = vec![format!("{REFRESH_COOKIE_NAME}={token}")];
    cookie_attributes(state, &mut parts);
    parts.push(format!("Max-Age={max_age}"));
    parts.push(format!("Expires={}", expires_at.to_rfc2822()));

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn build_clear_refresh_cookie(state: &AppState) -> AppResult<HeaderValue> {
    let mut parts = vec![format!("{REFRESH_COOKIE_NAME}=")];
    cookie_attributes(state, &mut parts);
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}
