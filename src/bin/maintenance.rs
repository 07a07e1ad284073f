use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use panel::{
    auth::{password, Role},
    config::AppConfig,
    db,
    ingest,
    models::{NewUser, NewWorker},
    month::MonthDate,
    payroll,
    schema::{users, workers},
};

const USAGE: &str = "Usage:
  maintenance create-admin <email> <display-name> <password>
  maintenance sync-csv <path>
  maintenance rebuild <YYYY-MM>";

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["create-admin", email, name, secret] => create_admin(email, name, secret),
        ["sync-csv", path] => sync_csv(path),
        ["rebuild", month] => rebuild(month),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn connect() -> Result<(AppConfig, db::PgPool)> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "loaded panel configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    Ok((config, pool))
}

fn create_admin(email: &str, name: &str, raw_password: &str) -> Result<()> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        bail!("{email:?} is not an email address");
    }
    if raw_password.chars().count() < password::MIN_PASSWORD_LEN {
        bail!(
            "password must have at least {} characters",
            password::MIN_PASSWORD_LEN
        );
    }

    let (_, pool) = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let password_hash = password::hash_password(raw_password)?;

    let worker_id = conn
        .transaction::<Uuid, diesel::result::Error, _>(|conn| {
            let user_id = Uuid::new_v4();
            diesel::insert_into(users::table)
                .values(&NewUser {
                    id: user_id,
                    email: email.clone(),
                    password_hash,
                })
                .execute(conn)?;
            let worker_id = Uuid::new_v4();
            diesel::insert_into(workers::table)
                .values(&NewWorker {
                    id: worker_id,
                    user_id,
                    display_name: name.trim().to_string(),
                    role: Role::Admin.as_str().to_string(),
                    is_active: true,
                    external_ref: None,
                    shift_start: None,
                })
                .execute(conn)?;
            Ok(worker_id)
        })
        .with_context(|| format!("failed to create admin {email}"))?;

    println!("Created admin {email} (worker {worker_id}).");
    Ok(())
}

fn sync_csv(path: &str) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {path}"))?;
    let text = ingest::decode_text(&bytes);

    let (config, pool) = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let report = ingest::sync_attendance(&mut conn, &text)?;

    println!(
        "Inserted {} of {} lines ({} malformed, {} without worker, {} without name).",
        report.inserted,
        report.total_lines,
        report.skipped_bad,
        report.skipped_no_worker,
        report.skipped_empty_name
    );
    if !report.unmatched_names.is_empty() {
        println!("Unmatched names: {}", report.unmatched_names.join(", "));
    }

    for month in &report.months {
        let earnings = payroll::recompute_monthly_earnings(&mut conn, *month, &config.payroll)
            .with_context(|| format!("failed to recompute {month}"))?;
        println!("Recomputed {}: {earnings} workers.", month.short());
    }
    Ok(())
}

fn rebuild(raw_month: &str) -> Result<()> {
    let month = MonthDate::parse(raw_month)?;
    let (config, pool) = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let report = payroll::rebuild_month(&mut conn, month, &config.payroll)
        .with_context(|| format!("failed to rebuild {}", month.short()))?;
    println!(
        "Rebuilt {}: {} bonuses ({} capped), {} earnings rows.",
        month.short(),
        report.bonuses,
        report.capped,
        report.earnings
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
