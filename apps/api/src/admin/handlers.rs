use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::auth::{password_matches, AUTH_COOKIE, DEFAULT_TOKEN_TTL_SECS};
use crate::errors::AppError;
use crate::logging::{LogLevel, LogQuery};
use crate::metrics::MetricsPageQuery;
use crate::state::AppState;

const METRICS_DEFAULT_LIMIT: usize = 200;
const METRICS_MIN_LIMIT: usize = 10;
const METRICS_MAX_LIMIT: usize = 1000;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Deserialize)]
pub struct MetricsParams {
    pub limit: Option<String>,
    pub cursor: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

fn auth_cookie(token: String) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(DEFAULT_TOKEN_TTL_SECS))
        .build()
}

fn configured_password(state: &AppState) -> Result<&str, AppError> {
    state
        .config
        .metrics_password
        .as_deref()
        .ok_or(AppError::NotConfigured("METRICS_PASSWORD"))
}

/// Admits a valid session cookie, or the admin password as a Bearer token.
/// A password login also yields a fresh session cookie.
fn authorize(state: &AppState, jar: CookieJar, headers: &HeaderMap) -> Result<CookieJar, AppError> {
    let password = configured_password(state)?;
    let signer = state
        .signer
        .as_ref()
        .ok_or(AppError::NotConfigured("METRICS_AUTH_SECRET"))?;

    if jar
        .get(AUTH_COOKIE)
        .is_some_and(|c| signer.verify(c.value()))
    {
        return Ok(jar);
    }

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match bearer {
        Some(given) if password_matches(password, given) => {
            Ok(jar.add(auth_cookie(signer.issue(DEFAULT_TOKEN_TTL_SECS))))
        }
        _ => Err(AppError::Unauthorized),
    }
}

/// POST /api/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let password = configured_password(&state)?;
    let signer = state
        .signer
        .as_ref()
        .ok_or(AppError::NotConfigured("METRICS_AUTH_SECRET"))?;
    if !password_matches(password, &req.password) {
        warn!("admin login rejected");
        return Err(AppError::Unauthorized);
    }
    info!("admin login");
    let jar = jar.add(auth_cookie(signer.issue(DEFAULT_TOKEN_TTL_SECS)));
    Ok((jar, Json(json!({ "ok": true }))))
}

/// POST /api/auth/logout
pub async fn handle_logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = jar.remove(Cookie::build((AUTH_COOKIE, "")).path("/"));
    (jar, Json(json!({ "ok": true })))
}

/// GET /api/metrics
pub async fn handle_metrics(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Query(params): Query<MetricsParams>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let jar = authorize(&state, jar, &headers)?;

    let limit = params
        .limit
        .and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(METRICS_DEFAULT_LIMIT)
        .clamp(METRICS_MIN_LIMIT, METRICS_MAX_LIMIT);
    let query = MetricsPageQuery {
        limit: Some(limit),
        cursor: parse_cursor(params.cursor.as_deref()),
        max_bytes: None,
        model: params.model.filter(|m| !m.is_empty()),
        endpoint: params.endpoint.filter(|e| !e.is_empty()),
    };

    let page = state.metrics.page(&query).await;
    let totals = state.metrics.totals().await;
    Ok((
        jar,
        Json(json!({
            "ok": true,
            "metrics": page.metrics,
            "totals": totals,
            "nextCursor": page.next_cursor,
        })),
    ))
}

/// GET /api/logs
///
/// `level` may repeat (`?level=warn&level=error`) or hold a comma list.
pub async fn handle_logs(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let jar = authorize(&state, jar, &headers)?;
    let query = parse_log_query(&params)?;
    let page = state.logs.load(&query).await;
    Ok((
        jar,
        Json(json!({
            "ok": true,
            "entries": page.entries,
            "nextCursor": page.next_cursor,
        })),
    ))
}

fn parse_cursor(raw: Option<&str>) -> usize {
    raw.and_then(|c| c.trim().parse().ok()).unwrap_or(0)
}

fn parse_log_query(params: &[(String, String)]) -> Result<LogQuery, AppError> {
    let mut query = LogQuery::default();
    for (key, value) in params {
        match key.as_str() {
            "requestId" => query.request_id = Some(value.trim().to_string()).filter(|v| !v.is_empty()),
            "unattributed" => query.unattributed = matches!(value.as_str(), "1" | "true"),
            "level" => {
                for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    let level = part.parse::<LogLevel>().map_err(AppError::Validation)?;
                    if !query.levels.contains(&level) {
                        query.levels.push(level);
                    }
                }
            }
            "limit" => query.limit = value.trim().parse().ok(),
            "cursor" => query.cursor = parse_cursor(Some(value)),
            _ => {}
        }
    }
    Ok(query)
}
