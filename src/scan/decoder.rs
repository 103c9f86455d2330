use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::ScanError;
use crate::models::EmployeeId;

static EMPLOYEE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^EMP\d{4}-(\d{3,})$").expect("employee code pattern is valid"));

/// Turn decoded QR text into an employee id.
///
/// Accepted payloads, in order of precedence:
/// - JSON `{"type": "employee", "employee_id" | "id": <n>}`, or the same
///   object carrying only a `"code"` that is itself an employee code;
/// - an employee code such as `EMP2024-017`, where the trailing digit group
///   is the id;
/// - a bare positive integer.
pub fn decode_identity(raw: &str) -> Result<EmployeeId, ScanError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ScanError::DecodeFailure("empty payload".into()));
    }

    if let Some(id) = from_structured(text) {
        return Ok(id);
    }
    if let Some(id) = from_employee_code(text) {
        return Ok(id);
    }
    if let Some(id) = parse_positive(text) {
        return Ok(id);
    }

    Err(ScanError::DecodeFailure(truncate_for_display(text)))
}

fn from_structured(text: &str) -> Option<EmployeeId> {
    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(text) else {
        return None;
    };

    let is_employee = fields
        .get("type")
        .and_then(Value::as_str)
        .map(|kind| kind.trim().eq_ignore_ascii_case("employee"))
        .unwrap_or(false);
    if !is_employee {
        return None;
    }

    ["employee_id", "id"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(positive_number))
        .or_else(|| {
            fields
                .get("code")
                .and_then(Value::as_str)
                .and_then(|code| from_employee_code(code.trim()))
        })
}

fn positive_number(value: &Value) -> Option<EmployeeId> {
    match value {
        Value::Number(number) => {
            if let Some(id) = number.as_u64() {
                return (id > 0).then_some(id);
            }
            let float = number.as_f64()?;
            let whole = float.is_finite() && float > 0.0 && float.fract() == 0.0 && float <= u64::MAX as f64;
            whole.then_some(float as u64)
        }
        Value::String(raw) => parse_positive(raw.trim()),
        _ => None,
    }
}

fn from_employee_code(text: &str) -> Option<EmployeeId> {
    let captures = EMPLOYEE_CODE.captures(text)?;
    parse_positive(captures.get(1)?.as_str())
}

fn parse_positive(text: &str) -> Option<EmployeeId> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<EmployeeId>().ok().filter(|id| *id > 0)
}

fn truncate_for_display(text: &str) -> String {
    const MAX_CHARS: usize = 48;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(MAX_CHARS).collect();
    shortened.push('…');
    shortened
}
