//! Invoice rendering on A4 pages with the standard Helvetica font.
//!
//! Text goes through WinAnsiEncoding, so Spanish accents and the euro sign
//! render without embedding a font. Drafts carry a diagonal `BORRADOR`
//! watermark on every page.

use std::ops::Range;

use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str};
use uuid::Uuid;

use crate::ingest::CallCode;
use crate::models::{MonthlyBonus, MonthlyEarnings};
use crate::month::MonthDate;
use crate::payroll::PayrollRules;

const PAGE_W: f32 = 595.0;
const PAGE_H: f32 = 842.0;
const MARGIN: f32 = 50.0;
const ROW_H: f32 = 20.0;
const FONT_SIZE: f32 = 10.0;
const HEADER_FONT_SIZE: f32 = 10.5;
const TITLE_FONT_SIZE: f32 = 18.0;
const COLUMNS: [(&str, f32); 4] = [
    ("Concepto", 235.0),
    ("Cantidad", 70.0),
    ("Tarifa", 90.0),
    ("Importe", 100.0),
];
/// Table top on the first page, below title and address blocks.
const FIRST_TABLE_TOP: f32 = PAGE_H - MARGIN - 210.0;
const NEXT_TABLE_TOP: f32 = PAGE_H - MARGIN - 50.0;
/// Lowest y a table row may start at, leaving room for the page number.
const TABLE_FLOOR: f32 = MARGIN + 20.0;
const TOTALS_HEIGHT: f32 = 5.0 * ROW_H;

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceParty {
    pub name: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceLine {
    pub concept: String,
    pub quantity: Option<String>,
    pub rate_cents: Option<i64>,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDocument {
    pub number: String,
    pub month: MonthDate,
    pub issuer: InvoiceParty,
    pub recipient: InvoiceParty,
    pub lines: Vec<InvoiceLine>,
    pub base_cents: i64,
    pub bonus_cents: i64,
    pub penalty_cents: i64,
    pub total_cents: i64,
    pub draft: bool,
}

impl InvoiceDocument {
    /// Builds the invoice a worker issues to the company for one month of
    /// stored earnings.
    pub fn from_earnings(
        worker_id: Uuid,
        worker_name: &str,
        earnings: &MonthlyEarnings,
        bonuses: &[MonthlyBonus],
        rules: &PayrollRules,
        company: InvoiceParty,
        draft: bool,
    ) -> Self {
        let month = MonthDate::containing(earnings.month_date);
        let mut lines = Vec::new();

        for code in CallCode::ALL {
            let minutes = match code {
                CallCode::Free => earnings.minutes_free,
                CallCode::Rueda => earnings.minutes_rueda,
                CallCode::Cliente => earnings.minutes_cliente,
                CallCode::Repite => earnings.minutes_repite,
            };
            if minutes == 0 {
                continue;
            }
            let rate = rules.rate_for(code);
            lines.push(InvoiceLine {
                concept: format!("Minutos {code}"),
                quantity: Some(format!("{minutes} min")),
                rate_cents: Some(rate),
                amount_cents: i64::from(minutes) * rate,
            });
        }
        if earnings.captadas > 0 {
            lines.push(InvoiceLine {
                concept: "Captadas".to_string(),
                quantity: Some(earnings.captadas.to_string()),
                rate_cents: Some(rules.captada_bonus_cents),
                amount_cents: i64::from(earnings.captadas) * rules.captada_bonus_cents,
            });
        }
        for bonus in bonuses.iter().filter(|b| b.amount_cents > 0) {
            let capped = if bonus.capped { " (con tope)" } else { "" };
            lines.push(InvoiceLine {
                concept: format!(
                    "Bonus {} · posición {}{capped}",
                    bonus.category, bonus.position
                ),
                quantity: None,
                rate_cents: None,
                amount_cents: bonus.amount_cents,
            });
        }
        if earnings.penalty_cents > 0 {
            lines.push(InvoiceLine {
                concept: "Penalizaciones".to_string(),
                quantity: None,
                rate_cents: None,
                amount_cents: -earnings.penalty_cents,
            });
        }

        let short_id = worker_id.simple().to_string();
        Self {
            number: format!("{}-{}", month.short(), &short_id[..8]),
            month,
            issuer: InvoiceParty {
                name: worker_name.to_string(),
                lines: Vec::new(),
            },
            recipient: company,
            lines,
            base_cents: earnings.base_cents,
            bonus_cents: earnings.bonus_cents,
            penalty_cents: earnings.penalty_cents,
            total_cents: earnings.total_cents,
            draft,
        }
    }
}

/// Maps text to WinAnsi bytes. Characters outside the code page become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch {
            ' '..='~' => ch as u8,
            '\u{a0}'..='\u{ff}' => ch as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}

/// `1234567` cents becomes `12.345,67 €`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let units = (abs / 100).to_string();
    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (idx, digit) in units.chars().enumerate() {
        if idx > 0 && (units.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    format!("{sign}{grouped},{:02} €", abs % 100)
}

/// Splits `rows` into page ranges. The last page also needs room for the
/// totals block, otherwise totals get a page of their own.
fn paginate(rows: usize) -> Vec<Range<usize>> {
    let capacity = |top: f32| (((top - ROW_H) - TABLE_FLOOR) / ROW_H).floor() as usize;
    let first = capacity(FIRST_TABLE_TOP);
    let next = capacity(NEXT_TABLE_TOP);

    let mut pages = Vec::new();
    let mut start = 0;
    let mut per_page = first;
    loop {
        let end = (start + per_page).min(rows);
        pages.push(start..end);
        start = end;
        if start >= rows {
            break;
        }
        per_page = next;
    }

    let last = pages.len() - 1;
    let top = if last == 0 { FIRST_TABLE_TOP } else { NEXT_TABLE_TOP };
    let used = (pages[last].len() + 1) as f32 * ROW_H;
    if top - used - TOTALS_HEIGHT < TABLE_FLOOR {
        pages.push(rows..rows);
    }
    pages
}

struct InvoiceWriter {
    pdf: Pdf,
    catalog_id: Ref,
    pages_id: Ref,
    font_id: Ref,
    bold_id: Ref,
    page_refs: Vec<Ref>,
    next_id: i32,
}

impl InvoiceWriter {
    fn new() -> Self {
        let mut pdf = Pdf::new();
        let catalog_id = Ref::new(1);
        let pages_id = Ref::new(2);
        let font_id = Ref::new(3);
        let bold_id = Ref::new(4);

        pdf.type1_font(font_id)
            .base_font(Name(b"Helvetica"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));
        pdf.type1_font(bold_id)
            .base_font(Name(b"Helvetica-Bold"))
            .encoding_predefined(Name(b"WinAnsiEncoding"));

        Self {
            pdf,
            catalog_id,
            pages_id,
            font_id,
            bold_id,
            page_refs: Vec::new(),
            next_id: 5,
        }
    }

    fn fresh_ref(&mut self) -> Ref {
        let id = self.next_id;
        self.next_id += 1;
        Ref::new(id)
    }

    fn push_page(&mut self, content: Content) {
        let page_id = self.fresh_ref();
        let content_id = self.fresh_ref();
        self.page_refs.push(page_id);

        {
            let mut page = self.pdf.page(page_id);
            page.parent(self.pages_id)
                .media_box(Rect::new(0.0, 0.0, PAGE_W, PAGE_H))
                .contents(content_id);
            let mut resources = page.resources();
            let mut fonts = resources.fonts();
            fonts.pair(Name(b"F1"), self.font_id);
            fonts.pair(Name(b"F2"), self.bold_id);
        }

        self.pdf.stream(content_id, &content.finish());
    }

    fn finish(mut self) -> Vec<u8> {
        self.pdf.catalog(self.catalog_id).pages(self.pages_id);
        self.pdf
            .pages(self.pages_id)
            .count(self.page_refs.len() as i32)
            .kids(self.page_refs.iter().copied());
        self.pdf.finish()
    }
}

fn text(content: &mut Content, font: &[u8], size: f32, x: f32, y: f32, value: &str) {
    content.begin_text();
    content.set_font(Name(font), size);
    content.set_text_matrix([1.0, 0.0, 0.0, 1.0, x, y]);
    content.show(Str(&encode_win_ansi(value)));
    content.end_text();
}

/// Rough Helvetica advance, good enough to right-align numbers.
fn text_width(value: &str, size: f32) -> f32 {
    value.chars().count() as f32 * size * 0.52
}

fn text_right(content: &mut Content, font: &[u8], size: f32, right: f32, y: f32, value: &str) {
    text(content, font, size, right - text_width(value, size), y, value);
}

fn hline(content: &mut Content, x1: f32, x2: f32, y: f32) {
    content.save_state();
    content.set_stroke_rgb(0.65, 0.65, 0.65);
    content.set_line_width(0.5);
    content.move_to(x1, y);
    content.line_to(x2, y);
    content.stroke();
    content.restore_state();
}

fn watermark(content: &mut Content) {
    let (sin, cos) = 45f32.to_radians().sin_cos();
    content.save_state();
    content.set_fill_rgb(0.85, 0.85, 0.85);
    content.begin_text();
    content.set_font(Name(b"F2"), 96.0);
    content.set_text_matrix([cos, sin, -sin, cos, 130.0, 250.0]);
    content.show(Str(b"BORRADOR"));
    content.end_text();
    content.restore_state();
}

fn party_block(content: &mut Content, x: f32, top: f32, label: &str, party: &InvoiceParty) {
    text(content, b"F2", FONT_SIZE, x, top, label);
    text(content, b"F1", FONT_SIZE + 1.0, x, top - 16.0, &party.name);
    for (idx, line) in party.lines.iter().enumerate() {
        text(content, b"F1", FONT_SIZE, x, top - 30.0 - idx as f32 * 13.0, line);
    }
}

fn table_header(content: &mut Content, y: f32) {
    let width: f32 = COLUMNS.iter().map(|(_, w)| w).sum();
    content.save_state();
    content.set_fill_rgb(0.85, 0.87, 0.90);
    content.rect(MARGIN, y, width, ROW_H);
    content.fill_nonzero();
    content.restore_state();

    let mut x = MARGIN;
    for (idx, (label, w)) in COLUMNS.iter().enumerate() {
        if idx == 0 {
            text(content, b"F2", HEADER_FONT_SIZE, x + 4.0, y + 6.0, label);
        } else {
            text_right(content, b"F2", HEADER_FONT_SIZE, x + w - 4.0, y + 6.0, label);
        }
        x += w;
    }
}

fn table_row(content: &mut Content, y: f32, line: &InvoiceLine, stripe: bool) {
    let width: f32 = COLUMNS.iter().map(|(_, w)| w).sum();
    if stripe {
        content.save_state();
        content.set_fill_rgb(0.96, 0.96, 0.96);
        content.rect(MARGIN, y, width, ROW_H);
        content.fill_nonzero();
        content.restore_state();
    }

    let cells = [
        line.quantity.clone().unwrap_or_default(),
        line.rate_cents.map(format_cents).unwrap_or_default(),
        format_cents(line.amount_cents),
    ];
    text(content, b"F1", FONT_SIZE, MARGIN + 4.0, y + 6.0, &line.concept);
    let mut right = MARGIN + COLUMNS[0].1;
    for (cell, (_, w)) in cells.iter().zip(&COLUMNS[1..]) {
        right += w;
        text_right(content, b"F1", FONT_SIZE, right - 4.0, y + 6.0, cell);
    }
}

fn totals_block(content: &mut Content, top: f32, doc: &InvoiceDocument) {
    let right = MARGIN + COLUMNS.iter().map(|(_, w)| w).sum::<f32>() - 4.0;
    let label_x = right - 200.0;
    let rows = [
        ("Base", doc.base_cents),
        ("Bonus", doc.bonus_cents),
        ("Penalizaciones", -doc.penalty_cents),
    ];
    let mut y = top - ROW_H;
    for (label, cents) in rows {
        text(content, b"F1", FONT_SIZE, label_x, y, label);
        text_right(content, b"F1", FONT_SIZE, right, y, &format_cents(cents));
        y -= ROW_H * 0.8;
    }
    hline(content, label_x, right, y + ROW_H * 0.5);
    text(content, b"F2", FONT_SIZE + 2.0, label_x, y - 4.0, "Total");
    text_right(
        content,
        b"F2",
        FONT_SIZE + 2.0,
        right,
        y - 4.0,
        &format_cents(doc.total_cents),
    );
}

pub fn render_invoice(doc: &InvoiceDocument) -> Vec<u8> {
    let mut writer = InvoiceWriter::new();
    let pages = paginate(doc.lines.len());
    let page_count = pages.len();
    let table_right = MARGIN + COLUMNS.iter().map(|(_, w)| w).sum::<f32>();

    for (page_idx, range) in pages.into_iter().enumerate() {
        let mut content = Content::new();
        if doc.draft {
            watermark(&mut content);
        }

        let top = if page_idx == 0 {
            text(
                &mut content,
                b"F2",
                TITLE_FONT_SIZE,
                MARGIN,
                PAGE_H - MARGIN - 10.0,
                "Factura",
            );
            text_right(
                &mut content,
                b"F1",
                FONT_SIZE,
                table_right,
                PAGE_H - MARGIN - 4.0,
                &format!("Nº {}", doc.number),
            );
            text_right(
                &mut content,
                b"F1",
                FONT_SIZE,
                table_right,
                PAGE_H - MARGIN - 18.0,
                &format!("Periodo {}", doc.month.short()),
            );
            party_block(&mut content, MARGIN, PAGE_H - MARGIN - 60.0, "Emisor", &doc.issuer);
            party_block(
                &mut content,
                MARGIN + 260.0,
                PAGE_H - MARGIN - 60.0,
                "Destinatario",
                &doc.recipient,
            );
            FIRST_TABLE_TOP
        } else {
            text(
                &mut content,
                b"F1",
                FONT_SIZE,
                MARGIN,
                PAGE_H - MARGIN - 10.0,
                &format!("Factura {} (continuación)", doc.number),
            );
            NEXT_TABLE_TOP
        };

        let mut y = top - ROW_H;
        table_header(&mut content, y);
        for (offset, line) in doc.lines[range.clone()].iter().enumerate() {
            y -= ROW_H;
            table_row(&mut content, y, line, offset % 2 == 1);
        }
        hline(&mut content, MARGIN, table_right, y);

        if page_idx + 1 == page_count {
            totals_block(&mut content, y - 10.0, doc);
        }

        text_right(
            &mut content,
            b"F1",
            FONT_SIZE - 1.0,
            table_right,
            MARGIN - 20.0,
            &format!("Página {} de {}", page_idx + 1, page_count),
        );
        writer.push_page(content);
    }

    writer.finish()
}
