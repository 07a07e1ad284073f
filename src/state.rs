use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::NaiveDate;
use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    month::MonthDate,
    storage::ObjectStorage,
};

pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Upper bound for one attendance export download.
pub const EXPORT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

const EXPORT_USER_AGENT: &str = concat!("panel-attendance-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    /// Invoice PDFs.
    pub storage: Arc<dyn ObjectStorage>,
    pub jwt: JwtService,
    /// Client for the scheduled attendance export download.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        jwt: JwtService,
    ) -> anyhow::Result<Self> {
        let http = export_client()?;
        Ok(Self {
            pool,
            config: Arc::new(config),
            storage,
            jwt,
            http,
        })
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    /// Calendar day in the business timezone.
    pub fn today(&self) -> NaiveDate {
        self.config.local_now().date_naive()
    }

    /// Payroll month a request falls into when it names none.
    pub fn current_month(&self) -> MonthDate {
        MonthDate::containing(self.today())
    }
}

fn export_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(EXPORT_DOWNLOAD_TIMEOUT)
        .user_agent(EXPORT_USER_AGENT)
        .build()
        .context("failed to build attendance export client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_client_builds_with_panel_user_agent() {
        assert!(EXPORT_USER_AGENT.starts_with("panel-attendance-sync/"));
        assert!(export_client().is_ok());
    }
}
