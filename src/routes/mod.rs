use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{error::AppResult, month::MonthDate, state::AppState};

pub mod admin;
pub mod auth;
pub mod cron;
pub mod health;
pub mod incidents;
pub mod invoices;
pub mod panel;
pub mod presence;

/// Invoices are capped at 10 MiB; the limit leaves room for multipart framing.
const BODY_LIMIT_BYTES: usize = 12 * 1024 * 1024;

/// `?month=YYYY-MM&worker_id=…`, shared by most read endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub month: Option<String>,
    pub worker_id: Option<Uuid>,
}

/// Parses `raw`, falling back to the current month in business time.
pub(crate) fn resolve_month(state: &AppState, raw: Option<&str>) -> AppResult<MonthDate> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Ok(MonthDate::parse(raw)?),
        None => Ok(state.current_month()),
    }
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(origin = %value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(&state);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let admin_routes = Router::new()
        .route(
            "/workers",
            get(admin::list_workers).post(admin::create_worker),
        )
        .route(
            "/workers/:id",
            get(admin::get_worker).patch(admin::update_worker),
        )
        .route("/workers/:id/credentials", put(admin::update_credentials))
        .route(
            "/mappings",
            get(admin::list_mappings).post(admin::create_mapping),
        )
        .route("/mappings/:id", delete(admin::delete_mapping))
        .route("/sync-csv", post(admin::sync_csv))
        .route("/sync", post(admin::sync))
        .route("/attendance", get(admin::list_attendance))
        .route("/earnings/recompute", post(admin::recompute_earnings))
        .route("/bonus/generate", post(admin::generate_bonus))
        .route("/hours-summary", get(admin::hours_summary))
        .route("/teams", get(admin::list_teams).post(admin::create_team))
        .route("/teams/:id", delete(admin::delete_team))
        .route(
            "/teams/:id/members/:worker_id",
            put(admin::put_team_member).delete(admin::delete_team_member),
        );

    let panel_routes = Router::new()
        .route("/me", get(panel::me))
        .route("/dashboard", get(panel::dashboard))
        .route("/attendance", get(panel::attendance))
        .route("/earnings", get(panel::earnings))
        .route("/bonuses", get(panel::bonuses))
        .route("/ranking", get(panel::ranking))
        .route("/team-ranking", get(panel::team_ranking))
        .route("/team", get(panel::team));

    let presence_routes = Router::new()
        .route("/login", post(presence::login))
        .route("/logout", post(presence::logout))
        .route("/state", post(presence::change_state))
        .route("/me", get(presence::me))
        .route("/current", get(presence::current))
        .route("/events", get(presence::events))
        .route("/sessions", get(presence::sessions));

    let incident_routes = Router::new()
        .route(
            "/",
            get(incidents::list_incidents).post(incidents::create_incident),
        )
        .route("/:id", get(incidents::get_incident))
        .route("/:id/resolve", post(incidents::resolve_incident))
        .route("/:id/cancel", post(incidents::cancel_incident));

    let invoice_routes = Router::new()
        .route(
            "/",
            get(invoices::list_invoices).post(invoices::upload_invoice),
        )
        .route("/draft", get(invoices::draft_invoice))
        .route("/:id/url", get(invoices::invoice_url))
        .route("/:id/respond", post(invoices::respond_invoice));

    let cron_routes = Router::new()
        .route("/sync", post(cron::sync).get(cron::sync))
        .route("/rebuild", post(cron::rebuild).get(cron::rebuild));

    Router::new()
        .route("/api/health", get(health::health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/panel", panel_routes)
        .nest("/api/presence", presence_routes)
        .nest("/api/incidents", incident_routes)
        .nest("/api/invoices", invoice_routes)
        .nest("/api/cron", cron_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
