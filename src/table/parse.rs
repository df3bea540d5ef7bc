//! Conversions from raw cell text to document fields.

use std::sync::LazyLock;

use regex::Regex;

/// A line that is exactly a 10-13 digit taxpayer number.
#[allow(clippy::expect_used)]
static RUC_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10,13}$").expect("valid RUC line regex"));

/// Taxpayer number followed by the company name on the same line.
#[allow(clippy::expect_used)]
static RUC_INLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{10,13})\s+(.+)$").expect("valid inline RUC regex"));

#[allow(clippy::expect_used)]
static RUC_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{10,13}").expect("valid bare RUC regex"));

/// Non-numeric document type followed by `NNN-NNN-N...`.
#[allow(clippy::expect_used)]
static TIPO_SERIE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\D*?)\s*(\d{3})-(\d{3})-(\d+)").expect("valid type/series regex")
});

#[allow(clippy::expect_used)]
static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})/(\d{2})/(\d{4})$").expect("valid date regex"));

#[allow(clippy::expect_used)]
static DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2})/(\d{2})/(\d{4})\s+(\d{2}:\d{2}:\d{2})$").expect("valid datetime regex")
});

/// Type, series and sequence split out of the combined numbering cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NumeroParts {
    pub tipo_comprobante: String,
    /// `NNN-NNN` establishment and emission point.
    pub serie: String,
    pub numero_comprobante: String,
}

/// Splits the combined taxpayer-number / company-name cell.
///
/// Tries, in order: a multi-line cell whose first numeric line is the RUC,
/// an inline `digits name` form, and a bare digit run anywhere in the text.
/// Text without any digit run is returned whole as the name.
#[must_use]
pub fn split_ruc_razon_social(text: &str) -> (String, String) {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() > 1
        && let Some(pos) = lines.iter().position(|line| RUC_LINE.is_match(line))
    {
        let name = lines
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .map(|(_, line)| *line)
            .collect::<Vec<_>>()
            .join(" ");
        return (lines[pos].to_string(), name);
    }

    let flat = lines.join(" ");
    if let Some(caps) = RUC_INLINE.captures(&flat) {
        return (caps[1].to_string(), caps[2].trim().to_string());
    }

    if let Some(found) = RUC_BARE.find(&flat) {
        let name = format!("{} {}", &flat[..found.start()], &flat[found.end()..]);
        return (
            found.as_str().to_string(),
            name.split_whitespace().collect::<Vec<_>>().join(" "),
        );
    }

    (String::new(), flat)
}

/// Splits `Factura 001-002-000012345` into type, series and sequence.
///
/// Unrecognized text becomes the type with empty series and sequence.
#[must_use]
pub fn split_numero(text: &str) -> NumeroParts {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match TIPO_SERIE.captures(&flat) {
        Some(caps) => NumeroParts {
            tipo_comprobante: caps[1].trim().to_string(),
            serie: format!("{}-{}", &caps[2], &caps[3]),
            numero_comprobante: caps[4].to_string(),
        },
        None => NumeroParts {
            tipo_comprobante: flat,
            ..NumeroParts::default()
        },
    }
}

/// Parses a currency cell into an absolute amount rounded to cents.
///
/// Everything except digits and separators is dropped. When both `,` and
/// `.` appear the last one is the decimal separator; a lone `,` is a decimal
/// comma. Unparseable or empty text yields `0.0`.
#[must_use]
pub fn parse_currency(text: &str) -> f64 {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let normalized = match (kept.rfind(','), kept.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => kept.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => kept.replace(',', ""),
        (Some(_), None) => kept.replace(',', "."),
        _ => kept,
    };

    // Thousands separators may leave several points; keep only the last.
    let normalized = match normalized.rfind('.') {
        Some(last) if normalized[..last].contains('.') => {
            format!("{}{}", normalized[..last].replace('.', ""), &normalized[last..])
        }
        _ => normalized,
    };

    normalized
        .parse::<f64>()
        .map(|value| (value.abs() * 100.0).round() / 100.0)
        .unwrap_or(0.0)
}

/// Converts `DD/MM/YYYY` to `YYYY-MM-DD`; other text is returned unchanged.
#[must_use]
pub fn format_date(text: &str) -> String {
    let trimmed = text.trim();
    match DATE.captures(trimmed) {
        Some(caps) => format!("{}-{}-{}", &caps[3], &caps[2], &caps[1]),
        None => text.to_string(),
    }
}

/// Converts `DD/MM/YYYY HH:MM:SS` to `YYYY-MM-DD HH:MM:SS`; other text is returned unchanged.
#[must_use]
pub fn format_date_time(text: &str) -> String {
    let trimmed = text.trim();
    match DATE_TIME.captures(trimmed) {
        Some(caps) => format!("{}-{}-{} {}", &caps[3], &caps[2], &caps[1], &caps[4]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== RUC / Company Name ====================

    #[test]
    fn test_split_ruc_multiline() {
        let (ruc, name) = split_ruc_razon_social("1790012345001\nACME S.A.\nMATRIZ");
        assert_eq!(ruc, "1790012345001");
        assert_eq!(name, "ACME S.A. MATRIZ");
    }

    #[test]
    fn test_split_ruc_multiline_ruc_not_first() {
        let (ruc, name) = split_ruc_razon_social("ACME S.A.\n0990012345");
        assert_eq!(ruc, "0990012345");
        assert_eq!(name, "ACME S.A.");
    }

    #[test]
    fn test_split_ruc_inline() {
        let (ruc, name) = split_ruc_razon_social("1790012345001   ACME S.A.");
        assert_eq!(ruc, "1790012345001");
        assert_eq!(name, "ACME S.A.");
    }

    #[test]
    fn test_split_ruc_bare_digits() {
        let (ruc, name) = split_ruc_razon_social("ACME-1790012345001");
        assert_eq!(ruc, "1790012345001");
        assert_eq!(name, "ACME-");
    }

    #[test]
    fn test_split_ruc_without_digits_keeps_name() {
        let (ruc, name) = split_ruc_razon_social("CONSUMIDOR FINAL");
        assert_eq!(ruc, "");
        assert_eq!(name, "CONSUMIDOR FINAL");
    }

    // ==================== Type / Series / Sequence ====================

    #[test]
    fn test_split_numero_standard() {
        let parts = split_numero("Factura 001-002-000012345");
        assert_eq!(parts.tipo_comprobante, "Factura");
        assert_eq!(parts.serie, "001-002");
        assert_eq!(parts.numero_comprobante, "000012345");
    }

    #[test]
    fn test_split_numero_multiword_type_and_linebreak() {
        let parts = split_numero("Comprobante de Retención\n001-001-000000077");
        assert_eq!(parts.tipo_comprobante, "Comprobante de Retención");
        assert_eq!(parts.serie, "001-001");
        assert_eq!(parts.numero_comprobante, "000000077");
    }

    #[test]
    fn test_split_numero_unrecognized() {
        let parts = split_numero("Sin numeración");
        assert_eq!(parts.tipo_comprobante, "Sin numeración");
        assert!(parts.serie.is_empty());
        assert!(parts.numero_comprobante.is_empty());
    }

    // ==================== Currency ====================

    #[test]
    fn test_parse_currency_point_decimal() {
        assert!((parse_currency("$ 1234.567") - 1234.57).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_currency_comma_decimal() {
        assert!((parse_currency("12,5") - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_currency_mixed_separators() {
        assert!((parse_currency("1,234.50") - 1234.5).abs() < f64::EPSILON);
        assert!((parse_currency("1.234,50") - 1234.5).abs() < f64::EPSILON);
        assert!((parse_currency("1.234.567,25") - 1_234_567.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_currency_negative_is_absolute() {
        assert!((parse_currency("-45.10") - 45.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_currency_empty_is_zero() {
        assert!(parse_currency("").abs() < f64::EPSILON);
        assert!(parse_currency("n/a").abs() < f64::EPSILON);
    }

    // ==================== Dates ====================

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("05/03/2024"), "2024-03-05");
    }

    #[test]
    fn test_format_date_time() {
        assert_eq!(format_date_time("05/03/2024 13:45:10"), "2024-03-05 13:45:10");
    }

    #[test]
    fn test_format_date_passthrough() {
        assert_eq!(format_date("2024-03-05"), "2024-03-05");
        assert_eq!(format_date_time("05/03/2024"), "05/03/2024");
        assert_eq!(format_date(""), "");
    }
}
