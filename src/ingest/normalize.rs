//! Cell-level cleaning rules for attendance exports.

use chrono::NaiveDate;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use super::CallCode;

// Two-digit years first: chrono's %Y would read "24" as year 24.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%y", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

/// Accent-folds, lower-cases and collapses separators so that
/// `"  Tarotísta_Name "` and `"tarotista name"` compare equal.
pub fn fold_key(raw: &str) -> String {
    let folded: String = raw
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .flat_map(char::to_lowercase)
        .map(|ch| if ch == '_' || ch.is_whitespace() { ' ' } else { ch })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A single call cannot last longer than a day.
pub const MAX_ROW_MINUTES: i32 = 24 * 60;

/// `H:MM:SS`, `MM:SS` or a bare (possibly decimal) number of minutes.
/// Seconds round to the nearest minute; an empty cell counts as zero.
/// Anything above [`MAX_ROW_MINUTES`] is rejected.
pub fn parse_minutes(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0);
    }

    let minutes = if trimmed.contains(':') {
        let parts: Vec<u64> = trimmed
            .split(':')
            .map(|part| part.trim().parse::<u64>())
            .collect::<Result<_, _>>()
            .ok()?;
        let seconds = match parts.as_slice() {
            [hours, minutes, seconds] if *minutes < 60 && *seconds < 60 => hours
                .checked_mul(3600)?
                .checked_add(minutes * 60 + seconds)?,
            [minutes, seconds] if *seconds < 60 => minutes.checked_mul(60)?.checked_add(*seconds)?,
            _ => return None,
        };
        i32::try_from((seconds + 30) / 60).ok()?
    } else {
        let value: f64 = trimmed.replace(',', ".").parse().ok()?;
        if !value.is_finite() || value < 0.0 || value > f64::from(MAX_ROW_MINUTES) {
            return None;
        }
        value.round() as i32
    };

    (minutes <= MAX_ROW_MINUTES).then_some(minutes)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let token = raw.split_whitespace().next()?;
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
}

/// `Ok(None)` for an empty cell, `Err(())` for an unknown code.
fn parse_code(raw: &str) -> Result<Option<CallCode>, ()> {
    let key = fold_key(raw);
    let code = match key.as_str() {
        "" => return Ok(None),
        "free" | "gratis" | "libre" => CallCode::Free,
        "rueda" => CallCode::Rueda,
        "cliente" | "client" | "clientes" => CallCode::Cliente,
        "repite" | "repetido" | "repetida" | "repeat" => CallCode::Repite,
        _ => return Err(()),
    };
    Ok(Some(code))
}

/// Applies the empty-code rule: a call with minutes but no code is a
/// regular client call; no minutes and no code is not a call at all.
pub fn resolve_code(raw: &str, minutes: i32) -> Option<CallCode> {
    match parse_code(raw) {
        Ok(Some(code)) => Some(code),
        Ok(None) if minutes > 0 => Some(CallCode::Cliente),
        _ => None,
    }
}

pub fn parse_captured(raw: &str) -> bool {
    matches!(
        fold_key(raw).as_str(),
        "si" | "s" | "yes" | "y" | "true" | "1" | "x" | "captada" | "captado"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_accents_case_and_separators() {
        assert_eq!(fold_key("  Tarotísta_Nombre "), "tarotista nombre");
        assert_eq!(fold_key("DURACIÓN"), "duracion");
        assert_eq!(fold_key("María   José"), "maria jose");
        assert_eq!(fold_key("Nuñez"), "nunez");
    }

    #[test]
    fn parses_clock_durations_into_rounded_minutes() {
        assert_eq!(parse_minutes("1:05:00"), Some(65));
        assert_eq!(parse_minutes("0:12:29"), Some(12));
        assert_eq!(parse_minutes("0:12:30"), Some(13));
        assert_eq!(parse_minutes("07:45"), Some(8));
        assert_eq!(parse_minutes("0:75:00"), None);
        assert_eq!(parse_minutes("1:2:3:4"), None);
    }

    #[test]
    fn parses_bare_minutes() {
        assert_eq!(parse_minutes("42"), Some(42));
        assert_eq!(parse_minutes("12,6"), Some(13));
        assert_eq!(parse_minutes(""), Some(0));
        assert_eq!(parse_minutes("-3"), None);
        assert_eq!(parse_minutes("abc"), None);
    }

    #[test]
    fn rejects_durations_longer_than_a_day() {
        assert_eq!(parse_minutes("24:00:00"), Some(MAX_ROW_MINUTES));
        assert_eq!(parse_minutes("24:00:31"), None);
        assert_eq!(parse_minutes("5000000:00:00"), None);
        assert_eq!(parse_minutes("99999999999999999999:00"), None);
        assert_eq!(parse_minutes("1441"), None);
        assert_eq!(parse_minutes("2000000000"), None);
    }

    #[test]
    fn parses_common_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(parse_date("2024-03-07"), Some(expected));
        assert_eq!(parse_date("07/03/2024"), Some(expected));
        assert_eq!(parse_date("07-03-2024"), Some(expected));
        assert_eq!(parse_date("2024-03-07 18:22:01"), Some(expected));
        assert_eq!(parse_date("07/03/24"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn empty_code_defaults_to_cliente_only_with_minutes() {
        assert_eq!(resolve_code("", 5), Some(CallCode::Cliente));
        assert_eq!(resolve_code("", 0), None);
        assert_eq!(resolve_code("REPITE", 0), Some(CallCode::Repite));
        assert_eq!(resolve_code("Rueda", 3), Some(CallCode::Rueda));
        assert_eq!(resolve_code("misterio", 3), None);
    }

    #[test]
    fn captured_flag_accepts_spanish_and_english_truthy_values() {
        assert!(parse_captured("Sí"));
        assert!(parse_captured("x"));
        assert!(parse_captured("TRUE"));
        assert!(!parse_captured(""));
        assert!(!parse_captured("no"));
    }
}
