use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{CurrentWorker, Role},
    error::{AppError, AppResult},
    invoice_pdf::{render_invoice, InvoiceDocument, InvoiceParty},
    models::{Invoice, MonthlyBonus, MonthlyEarnings, NewInvoice, Worker},
    month::MonthDate,
    response::{ok, ApiJson},
    routes::{resolve_month, MonthQuery},
    schema::{invoices, monthly_bonuses, monthly_earnings, workers},
    state::AppState,
    storage::{attachment_disposition, invoice_key, PDF_CONTENT_TYPE},
};

pub const MAX_INVOICE_BYTES: usize = 10 * 1024 * 1024;
const MAX_ORIGINAL_NAME_CHARS: usize = 255;
const PRESIGN_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Accepted => "accepted",
            InvoiceStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceView {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub worker_name: Option<String>,
    pub month: MonthDate,
    pub original_name: String,
    pub size_bytes: i64,
    pub status: String,
    pub response_note: Option<String>,
    pub responded_by: Option<Uuid>,
    pub responded_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl InvoiceView {
    fn new(row: Invoice, worker_name: Option<String>) -> Self {
        Self {
            id: row.id,
            worker_id: row.worker_id,
            worker_name,
            month: MonthDate::containing(row.month_date),
            original_name: row.original_name,
            size_bytes: row.size_bytes,
            status: row.status,
            response_note: row.response_note,
            responded_by: row.responded_by,
            responded_at: row.responded_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Drops any client-side directory and rejects names the column cannot hold.
fn clean_original_name(raw: &str) -> AppResult<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if name.is_empty() {
        return Ok("factura.pdf".to_string());
    }
    if name.chars().count() > MAX_ORIGINAL_NAME_CHARS {
        return Err(AppError::bad_request(format!(
            "file name must have at most {MAX_ORIGINAL_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

fn looks_like_pdf(content_type: Option<&str>, bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
        || content_type.is_some_and(|ct| ct.eq_ignore_ascii_case(PDF_CONTENT_TYPE))
}

/// A tarotista's invoice for one month. Re-uploading replaces the file and
/// puts it back to pending.
pub async fn upload_invoice(
    State(state): State<AppState>,
    current: CurrentWorker,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, ApiJson<InvoiceView>)> {
    current.require(&[Role::Tarotista])?;

    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut month_raw: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("factura.pdf").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                file = Some((filename, content_type, data.to_vec()));
            }
            Some("month") => {
                month_raw = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| AppError::bad_request(err.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let (raw_name, content_type, bytes) =
        file.ok_or_else(|| AppError::bad_request("multipart field \"file\" is required"))?;
    let original_name = clean_original_name(&raw_name)?;
    let month_raw =
        month_raw.ok_or_else(|| AppError::bad_request("multipart field \"month\" is required"))?;
    let month = MonthDate::parse(&month_raw)?;

    if bytes.is_empty() {
        return Err(AppError::bad_request("file is empty"));
    }
    if bytes.len() > MAX_INVOICE_BYTES {
        return Err(AppError::bad_request("file exceeds 10 MiB"));
    }
    if !looks_like_pdf(content_type.as_deref(), &bytes) {
        return Err(AppError::bad_request("only PDF invoices are accepted"));
    }

    let worker_id = current.id();
    let key = invoice_key(worker_id, month);
    let size_bytes = bytes.len() as i64;

    let mut conn = state.db()?;
    // The key is shared by every upload of the month, so the object of an
    // existing invoice must survive a failed replacement.
    let replacing: bool = diesel::select(diesel::dsl::exists(
        invoices::table
            .filter(invoices::worker_id.eq(worker_id))
            .filter(invoices::month_date.eq(month.first_day())),
    ))
    .get_result(&mut conn)?;

    state
        .storage
        .put_object(
            &key,
            bytes,
            PDF_CONTENT_TYPE,
            attachment_disposition(&original_name),
        )
        .await?;

    let now = Utc::now().naive_utc();
    let stored = diesel::insert_into(invoices::table)
        .values(&NewInvoice {
            id: Uuid::new_v4(),
            worker_id,
            month_date: month.first_day(),
            storage_key: key.clone(),
            original_name: original_name.clone(),
            size_bytes,
            status: InvoiceStatus::Pending.as_str().to_string(),
        })
        .on_conflict((invoices::worker_id, invoices::month_date))
        .do_update()
        .set((
            invoices::storage_key.eq(&key),
            invoices::original_name.eq(&original_name),
            invoices::size_bytes.eq(size_bytes),
            invoices::status.eq(InvoiceStatus::Pending.as_str()),
            invoices::response_note.eq(None::<String>),
            invoices::responded_by.eq(None::<Uuid>),
            invoices::responded_at.eq(None::<NaiveDateTime>),
            invoices::updated_at.eq(now),
        ))
        .get_result::<Invoice>(&mut conn);

    let invoice = match stored {
        Ok(invoice) => invoice,
        Err(err) if replacing => return Err(err.into()),
        Err(err) => {
            if let Err(cleanup) = state.storage.delete_object(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "failed to remove orphaned invoice object");
            }
            return Err(err.into());
        }
    };

    tracing::info!(
        invoice_id = %invoice.id,
        worker_id = %worker_id,
        month = %month,
        size_bytes,
        "invoice uploaded"
    );
    Ok((StatusCode::CREATED, ok(InvoiceView::new(invoice, None))))
}

/// Admins see every invoice; everyone else only their own.
pub async fn list_invoices(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<Vec<InvoiceView>>> {
    let worker_filter = if current.role == Role::Admin {
        query.worker_id
    } else {
        Some(current.id())
    };
    let month = query
        .month
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(MonthDate::parse)
        .transpose()?;

    let mut conn = state.db()?;
    let mut listing = invoices::table
        .inner_join(workers::table)
        .select((invoices::all_columns, workers::display_name))
        .order((invoices::month_date.desc(), workers::display_name.asc()))
        .into_boxed();
    if let Some(worker_id) = worker_filter {
        listing = listing.filter(invoices::worker_id.eq(worker_id));
    }
    if let Some(month) = month {
        listing = listing.filter(invoices::month_date.eq(month.first_day()));
    }

    let rows: Vec<(Invoice, String)> = listing.load(&mut conn)?;
    Ok(ok(rows
        .into_iter()
        .map(|(row, name)| InvoiceView::new(row, Some(name)))
        .collect()))
}

#[derive(Serialize)]
pub struct InvoiceUrl {
    pub url: String,
    pub expires_in: u64,
}

pub async fn invoice_url(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<ApiJson<InvoiceUrl>> {
    let mut conn = state.db()?;
    let invoice: Invoice = invoices::table.find(invoice_id).first(&mut conn)?;
    if invoice.worker_id != current.id() {
        current.require(&[Role::Admin])?;
    }

    let url = state
        .storage
        .presign_get_object(&invoice.storage_key, PRESIGN_TTL)
        .await?;
    Ok(ok(InvoiceUrl {
        url,
        expires_in: PRESIGN_TTL.as_secs(),
    }))
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub status: String,
    pub note: Option<String>,
}

pub async fn respond_invoice(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> AppResult<ApiJson<InvoiceView>> {
    current.require(&[Role::Admin])?;
    let status = match payload.status.trim() {
        "accepted" => InvoiceStatus::Accepted,
        "rejected" => InvoiceStatus::Rejected,
        _ => return Err(AppError::bad_request("status must be accepted or rejected")),
    };
    let note = payload
        .note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let mut conn = state.db()?;
    let updated = conn.transaction::<Invoice, AppError, _>(|conn| {
        let invoice: Invoice = invoices::table
            .find(invoice_id)
            .for_update()
            .get_result(conn)?;
        if invoice.status != InvoiceStatus::Pending.as_str() {
            return Err(AppError::bad_request(format!(
                "invoice is already {}",
                invoice.status
            )));
        }
        let now = Utc::now().naive_utc();
        Ok(diesel::update(invoices::table.find(invoice_id))
            .set((
                invoices::status.eq(status.as_str()),
                invoices::response_note.eq(note),
                invoices::responded_by.eq(Some(current.id())),
                invoices::responded_at.eq(Some(now)),
                invoices::updated_at.eq(now),
            ))
            .get_result(conn)?)
    })?;

    tracing::info!(invoice_id = %invoice_id, status = %updated.status, "invoice reviewed");
    Ok(ok(InvoiceView::new(updated, None)))
}

fn company_party(state: &AppState) -> InvoiceParty {
    InvoiceParty {
        name: state.config.company_name.clone(),
        lines: state
            .config
            .company_tax_id
            .iter()
            .map(|tax_id| format!("CIF: {tax_id}"))
            .collect(),
    }
}

/// Renders the month's invoice from stored earnings. It carries the draft
/// watermark until an uploaded invoice for the month has been accepted.
pub async fn draft_invoice(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<(HeaderMap, Vec<u8>)> {
    let worker_id = match query.worker_id {
        Some(worker_id) if worker_id != current.id() => {
            current.require(&[Role::Admin])?;
            worker_id
        }
        _ => current.id(),
    };
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;

    let worker: Worker = workers::table.find(worker_id).first(&mut conn)?;
    let earnings: MonthlyEarnings = monthly_earnings::table
        .find((worker_id, month.first_day()))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "no earnings for that month"))?;
    let bonuses: Vec<MonthlyBonus> = monthly_bonuses::table
        .filter(monthly_bonuses::worker_id.eq(worker_id))
        .filter(monthly_bonuses::month_date.eq(month.first_day()))
        .order((monthly_bonuses::category.asc(), monthly_bonuses::position.asc()))
        .load(&mut conn)?;
    let accepted: bool = diesel::select(diesel::dsl::exists(
        invoices::table
            .filter(invoices::worker_id.eq(worker_id))
            .filter(invoices::month_date.eq(month.first_day()))
            .filter(invoices::status.eq(InvoiceStatus::Accepted.as_str())),
    ))
    .get_result(&mut conn)?;

    let mut document = InvoiceDocument::from_earnings(
        worker.id,
        &worker.display_name,
        &earnings,
        &bonuses,
        &state.config.payroll,
        company_party(&state),
        !accepted,
    );
    if let Some(external_ref) = &worker.external_ref {
        document.issuer.lines.push(format!("Ref. {external_ref}"));
    }
    let pdf = render_invoice(&document);

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(PDF_CONTENT_TYPE));
    let filename = format!("factura-{}.pdf", document.number);
    if let Some(value) = attachment_disposition(&filename)
        .and_then(|disposition| HeaderValue::from_str(&disposition).ok())
    {
        headers.insert(CONTENT_DISPOSITION, value);
    }

    tracing::info!(worker_id = %worker_id, month = %month, bytes = pdf.len(), "invoice draft rendered");
    Ok((headers, pdf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_detection_accepts_magic_or_content_type() {
        assert!(looks_like_pdf(None, b"%PDF-1.7\n"));
        assert!(looks_like_pdf(Some("application/pdf"), b"garbage"));
        assert!(!looks_like_pdf(Some("image/png"), b"\x89PNG"));
        assert!(!looks_like_pdf(None, b""));
    }

    #[test]
    fn original_names_are_bounded_and_stripped_of_paths() {
        assert_eq!(
            clean_original_name("C:\\Users\\luna\\factura marzo.pdf").unwrap(),
            "factura marzo.pdf"
        );
        assert_eq!(clean_original_name("  ").unwrap(), "factura.pdf");
        assert_eq!(clean_original_name(&"ñ".repeat(255)).unwrap().chars().count(), 255);

        let err = clean_original_name(&format!("{}.pdf", "a".repeat(300))).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
