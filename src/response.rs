use axum::Json;
use serde::Serialize;

/// Success body shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub ok: bool,
    pub data: T,
}

pub type ApiJson<T> = Json<Envelope<T>>;

pub fn ok<T: Serialize>(data: T) -> ApiJson<T> {
    Json(Envelope { ok: true, data })
}
