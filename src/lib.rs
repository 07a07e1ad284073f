pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod incidents;
pub mod ingest;
pub mod invoice_pdf;
pub mod models;
pub mod month;
pub mod payroll;
pub mod presence;
pub mod response;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod state;
pub mod storage;
pub mod utils;
