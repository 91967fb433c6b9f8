use serde::{Deserialize, Serialize};

use super::reader::RawCell;

/// How strictly numeric cells are validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoercionMode {
    /// Unparseable cells become 0
    #[default]
    Lenient,
    /// Unparseable non-blank cells are rejected
    Strict,
}

/// Coerce a cell to an integer metric.
///
/// Blank cells are always 0. `Err` carries the offending text and is only
/// returned in strict mode.
pub fn coerce_metric(cell: &RawCell, mode: CoercionMode) -> Result<i64, String> {
    let parsed = match cell {
        RawCell::Empty => return Ok(0),
        RawCell::Number(n) => float_to_metric(*n),
        RawCell::Text(s) => parse_metric_text(s),
    };

    match (parsed, mode) {
        (Some(v), _) => Ok(v),
        (None, CoercionMode::Lenient) => Ok(0),
        (None, CoercionMode::Strict) => Err(match cell {
            RawCell::Text(s) => s.clone(),
            RawCell::Number(n) => n.to_string(),
            RawCell::Empty => String::new(),
        }),
    }
}

fn parse_metric_text(s: &str) -> Option<i64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    if cleaned.is_empty() {
        return Some(0);
    }
    if let Ok(v) = cleaned.parse::<i64>() {
        return Some(v);
    }
    cleaned.parse::<f64>().ok().and_then(float_to_metric)
}

fn float_to_metric(n: f64) -> Option<i64> {
    if n.is_finite() {
        Some(n.trunc() as i64)
    } else {
        None
    }
}

/// Canonical participant id: trimmed text, never a float rendering.
///
/// Spreadsheet exports often turn integer ids into `1234.0`; those are
/// rendered back without the fractional part so joins match.
pub fn normalize_id(cell: &RawCell) -> Option<String> {
    let id = match cell {
        RawCell::Empty => return None,
        RawCell::Number(n) if n.is_finite() && n.fract() == 0.0 => format!("{}", *n as i64),
        RawCell::Number(n) => n.to_string(),
        RawCell::Text(s) => {
            let s = s.trim();
            match s.strip_suffix(".0") {
                Some(head) if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) => {
                    head.to_string()
                }
                _ => s.to_string(),
            }
        }
    };
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Trimmed display name, `None` when blank.
pub fn normalize_name(cell: &RawCell) -> Option<String> {
    match cell {
        RawCell::Empty => None,
        RawCell::Number(n) => Some(n.to_string()),
        RawCell::Text(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
    }
}
