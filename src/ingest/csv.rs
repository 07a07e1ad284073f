use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;

use super::normalize::{fold_key, parse_captured, parse_date, parse_minutes, resolve_code};
use super::{CallCode, CsvError};

const DATE_ALIASES: &[&str] = &["fecha", "date", "dia"];
const NAME_ALIASES: &[&str] = &["tarotista", "nombre", "name", "worker"];
const MINUTES_ALIASES: &[&str] = &["minutos", "tiempo", "duracion", "minutes", "time"];
const CODE_ALIASES: &[&str] = &["codigo", "code", "tipo", "resultado"];
const CAPTURED_ALIASES: &[&str] = &["captada", "captado", "captured"];
const REF_ALIASES: &[&str] = &["ref", "referencia", "external ref"];

/// One cleaned attendance line, not yet tied to a worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedRow {
    pub line: u64,
    pub date: NaiveDate,
    pub name: String,
    pub name_key: String,
    pub external_ref: Option<String>,
    pub minutes: i32,
    pub code: CallCode,
    pub captured: bool,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub rows: Vec<ParsedRow>,
    pub total_lines: usize,
    pub skipped_bad: usize,
    pub skipped_empty_name: usize,
}

struct Columns {
    date: usize,
    name: usize,
    minutes: usize,
    code: Option<usize>,
    captured: Option<usize>,
    external_ref: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self, CsvError> {
        let keys: Vec<String> = headers.iter().map(fold_key).collect();
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| keys.iter().position(|key| key == alias))
        };

        Ok(Self {
            date: find(DATE_ALIASES).ok_or(CsvError::MissingColumn("fecha"))?,
            name: find(NAME_ALIASES).ok_or(CsvError::MissingColumn("tarotista"))?,
            minutes: find(MINUTES_ALIASES).ok_or(CsvError::MissingColumn("minutos"))?,
            code: find(CODE_ALIASES),
            captured: find(CAPTURED_ALIASES),
            external_ref: find(REF_ALIASES),
        })
    }
}

/// Picks the most frequent of `,`, `;` and tab in the header line.
pub fn detect_delimiter(header_line: &str) -> u8 {
    let candidates = [b',', b';', b'\t'];
    let mut best = b',';
    let mut best_count = 0;
    for candidate in candidates {
        let count = header_line.bytes().filter(|b| *b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Parses an attendance export. Structural problems (no header, missing
/// required columns) fail the whole parse; bad lines are only counted.
pub fn parse_attendance(text: &str) -> Result<ParseOutcome, CsvError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let header_line = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or(CsvError::Empty)?;

    let mut reader = ReaderBuilder::new()
        .delimiter(detect_delimiter(header_line))
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let columns = Columns::locate(reader.headers()?)?;
    let mut outcome = ParseOutcome::default();

    for result in reader.records() {
        outcome.total_lines += 1;
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(error = %err, "unreadable attendance line");
                outcome.skipped_bad += 1;
                continue;
            }
        };
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let cell = |idx: usize| record.get(idx).unwrap_or("");
        let optional_cell = |idx: Option<usize>| idx.map(cell).unwrap_or("");

        let name = cell(columns.name).trim();
        if name.is_empty() {
            outcome.skipped_empty_name += 1;
            continue;
        }

        let Some(date) = parse_date(cell(columns.date)) else {
            tracing::debug!(line, value = cell(columns.date), "unparseable attendance date");
            outcome.skipped_bad += 1;
            continue;
        };
        let Some(minutes) = parse_minutes(cell(columns.minutes)) else {
            tracing::debug!(line, value = cell(columns.minutes), "unparseable attendance time");
            outcome.skipped_bad += 1;
            continue;
        };
        let Some(code) = resolve_code(optional_cell(columns.code), minutes) else {
            tracing::debug!(line, value = optional_cell(columns.code), "unusable call code");
            outcome.skipped_bad += 1;
            continue;
        };

        let external_ref = Some(optional_cell(columns.external_ref).trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        outcome.rows.push(ParsedRow {
            line,
            date,
            name: name.to_string(),
            name_key: fold_key(name),
            external_ref,
            minutes,
            code,
            captured: parse_captured(optional_cell(columns.captured)),
        });
    }

    Ok(outcome)
}

/// Windows-1252 characters for bytes 0x80..=0x9F. The five holes keep their
/// Latin-1 control code.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

fn cp1252_char(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_HIGH[usize::from(byte - 0x80)],
        _ => char::from(byte),
    }
}

/// Exports come as UTF-8 or, from older spreadsheets, Windows-1252. Bytes
/// that are not valid UTF-8 are read as Windows-1252.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().copied().map(cp1252_char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_semicolon_and_tab_exports() {
        assert_eq!(detect_delimiter("fecha;tarotista;minutos"), b';');
        assert_eq!(detect_delimiter("fecha\ttarotista\tminutos"), b'\t');
        assert_eq!(detect_delimiter("fecha,tarotista,minutos"), b',');
        assert_eq!(detect_delimiter("fecha"), b',');
    }

    #[test]
    fn parses_semicolon_export_with_bom_and_accented_headers() {
        let text = "\u{feff}Fecha;Tarotista;Duración;Código;Captada\n\
                    01/03/2024;Luna;0:10:00;Cliente;si\n\
                    02/03/2024;Sol;25;repite;\n";
        let outcome = parse_attendance(text).unwrap();
        assert_eq!(outcome.total_lines, 2);
        assert_eq!(outcome.rows.len(), 2);

        let first = &outcome.rows[0];
        assert_eq!(first.name, "Luna");
        assert_eq!(first.minutes, 10);
        assert_eq!(first.code, CallCode::Cliente);
        assert!(first.captured);
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let second = &outcome.rows[1];
        assert_eq!(second.code, CallCode::Repite);
        assert!(!second.captured);
    }

    #[test]
    fn applies_cleaning_rules_and_counts_skips() {
        let text = "fecha,tarotista,minutos,codigo\n\
                    2024-03-01,Luna,12,\n\
                    2024-03-01,,30,cliente\n\
                    2024-03-01,Luna,0,\n\
                    not-a-date,Luna,5,free\n\
                    2024-03-02,Luna,7,rueda\n";
        let outcome = parse_attendance(text).unwrap();
        assert_eq!(outcome.total_lines, 5);
        assert_eq!(outcome.skipped_empty_name, 1);
        assert_eq!(outcome.skipped_bad, 2);
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[0].code, CallCode::Cliente);
        assert_eq!(outcome.rows[1].code, CallCode::Rueda);
    }

    #[test]
    fn absurd_durations_are_counted_as_bad_lines() {
        let text = "fecha,tarotista,minutos,codigo\n\
                    2024-03-01,Luna,5000000:00:00,cliente\n\
                    2024-03-01,Luna,2000000000,cliente\n\
                    2024-03-01,Luna,45,cliente\n";
        let outcome = parse_attendance(text).unwrap();
        assert_eq!(outcome.skipped_bad, 2);
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].minutes, 45);
    }

    #[test]
    fn keeps_external_reference_when_present() {
        let text = "date\tname\tminutes\tcode\tref\n2024-04-02\tAlba R.\t3\tfree\tT-17\n";
        let outcome = parse_attendance(text).unwrap();
        assert_eq!(outcome.rows[0].external_ref.as_deref(), Some("T-17"));
        assert_eq!(outcome.rows[0].name_key, "alba r.");
    }

    #[test]
    fn row_number_column_is_not_a_reference() {
        let text = "id,fecha,tarotista,minutos\n1,2024-04-02,Luna,3\n";
        let outcome = parse_attendance(text).unwrap();
        assert_eq!(outcome.rows[0].external_ref, None);
    }

    #[test]
    fn missing_required_column_fails_the_parse() {
        let err = parse_attendance("fecha,codigo\n2024-01-01,free\n").unwrap_err();
        assert!(matches!(err, CsvError::MissingColumn("tarotista")));
        assert!(matches!(parse_attendance("\n  \n"), Err(CsvError::Empty)));
    }

    #[test]
    fn latin1_exports_are_decoded() {
        let bytes = b"fecha;tarotista;minutos\n2024-03-01;Mar\xeda;5\n";
        let text = decode_text(bytes);
        assert!(text.contains("María"));
        let outcome = parse_attendance(&text).unwrap();
        assert_eq!(outcome.rows[0].name, "María");
    }

    #[test]
    fn windows_1252_punctuation_is_decoded() {
        let text = decode_text(b"nota\n\x93Luna\x94 \x96 50\x80\n");
        assert_eq!(text, "nota\n\u{201C}Luna\u{201D} \u{2013} 50\u{20AC}\n");
        assert_eq!(cp1252_char(0x81), '\u{0081}');
        assert_eq!(cp1252_char(0xE1), 'á');
    }
}
