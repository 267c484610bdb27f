use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_BLANK: &str = "This field may not be blank.";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$")
        .expect("email pattern is valid")
});

/// Field name to list of messages. Serialized as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}

/// Reads typed values out of a decoded request body, collecting every
/// problem into one `FieldErrors` instead of stopping at the first.
///
/// In partial mode an absent field is skipped rather than reported as
/// missing; present fields are still fully validated.
pub struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    partial: bool,
    errors: FieldErrors,
}

impl<'a> FieldReader<'a> {
    pub fn new(fields: &'a Map<String, Value>, partial: bool) -> Self {
        Self {
            fields,
            partial,
            errors: FieldErrors::new(),
        }
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains(field)
    }

    pub fn into_errors(self) -> FieldErrors {
        self.errors
    }

    /// Required, non-blank, trimmed text.
    pub fn text(&mut self, name: &str, max_len: usize) -> Option<String> {
        let raw = self.required(name)?;
        let value = self.stringify(name, raw)?;
        let value = value.trim();
        if value.is_empty() {
            self.error(name, NOT_BLANK);
            return None;
        }
        self.check_len(name, value, max_len)
    }

    /// Optional text where an empty string is allowed. `null` reads as empty.
    pub fn blankable_text(&mut self, name: &str, max_len: usize) -> Option<String> {
        let raw = self.fields.get(name)?;
        if raw.is_null() {
            return Some(String::new());
        }
        let value = self.stringify(name, raw)?;
        self.check_len(name, value.trim(), max_len)
    }

    /// Required text that is taken verbatim (no trimming), e.g. passwords.
    pub fn secret(&mut self, name: &str) -> Option<String> {
        let raw = self.required(name)?;
        let value = self.stringify(name, raw)?;
        if value.is_empty() {
            self.error(name, NOT_BLANK);
            return None;
        }
        Some(value)
    }

    /// Optional secret. Absent or empty means "no change".
    pub fn optional_secret(&mut self, name: &str) -> Option<String> {
        match self.fields.get(name) {
            None | Some(Value::Null) => None,
            Some(raw) => self.stringify(name, raw).filter(|v| !v.is_empty()),
        }
    }

    /// Validates an already-read value as an email address.
    pub fn check_email(&mut self, name: &str, value: String) -> Option<String> {
        if value.is_empty() || is_valid_email(&value) {
            Some(value)
        } else {
            self.error(name, "Enter a valid email address.");
            None
        }
    }

    /// Required fixed-point number with at most `max_digits` digits in total,
    /// `decimal_places` of them after the point. Trailing fractional zeros
    /// do not count.
    pub fn decimal(&mut self, name: &str, max_digits: u32, decimal_places: u32) -> Option<Decimal> {
        let raw = self.required(name)?;
        let text = match raw {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => {
                self.error(name, "A valid number is required.");
                return None;
            }
        };

        let Ok(parsed) = Decimal::from_str(&text) else {
            self.error(name, "A valid number is required.");
            return None;
        };

        let mut value = parsed.normalize();
        let places = value.scale();
        let digits = value.mantissa().unsigned_abs().to_string().len() as u32;
        let whole = digits.saturating_sub(places);

        if places > decimal_places {
            self.error(
                name,
                format!("Ensure that there are no more than {decimal_places} decimal places."),
            );
            return None;
        }
        if whole > max_digits - decimal_places {
            self.error(
                name,
                format!(
                    "Ensure that there are no more than {} digits before the decimal point.",
                    max_digits - decimal_places
                ),
            );
            return None;
        }

        value.rescale(decimal_places);
        Some(value)
    }

    /// Optional boolean. Accepts JSON booleans, 0/1 and the usual form spellings.
    pub fn boolean(&mut self, name: &str) -> Option<bool> {
        let raw = self.fields.get(name)?;
        let parsed = match raw {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            self.error(name, "Must be a valid boolean.");
        }
        parsed
    }

    /// Optional, nullable timestamp. `Some(None)` means the field was sent
    /// as null or empty and should be cleared.
    pub fn timestamp(&mut self, name: &str) -> Option<Option<DateTime<Utc>>> {
        let raw = self.fields.get(name)?;
        let text = match raw {
            Value::Null => return Some(None),
            Value::String(s) if s.trim().is_empty() => return Some(None),
            Value::String(s) => s.trim(),
            _ => {
                self.error(name, DATETIME_FORMAT);
                return None;
            }
        };

        match parse_datetime(text) {
            Some(parsed) => Some(Some(parsed)),
            None => {
                self.error(name, DATETIME_FORMAT);
                None
            }
        }
    }

    /// Required reference to another record by numeric identifier.
    pub fn reference(&mut self, name: &str) -> Option<i64> {
        let raw = self.required(name)?;
        let id = match raw {
            Value::Number(n) => n.as_i64(),
            Value::String(s) if s.trim().is_empty() => {
                self.error(name, NOT_NULL);
                return None;
            }
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Null => {
                self.error(name, NOT_NULL);
                return None;
            }
            other => {
                self.error(
                    name,
                    format!("Incorrect type. Expected pk value, received {}.", type_name(other)),
                );
                return None;
            }
        };
        match id {
            Some(id) if id > 0 => Some(id),
            _ => {
                self.error(name, format!("Invalid pk \"{}\" - object does not exist.", display(raw)));
                None
            }
        }
    }

    fn required(&mut self, name: &str) -> Option<&'a Value> {
        match self.fields.get(name) {
            None => {
                if !self.partial {
                    self.error(name, REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                self.error(name, NOT_NULL);
                None
            }
            Some(value) => Some(value),
        }
    }

    fn stringify(&mut self, name: &str, raw: &Value) -> Option<String> {
        match raw {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => {
                self.error(name, "Not a valid string.");
                None
            }
        }
    }

    fn check_len(&mut self, name: &str, value: &str, max_len: usize) -> Option<String> {
        if value.chars().count() > max_len {
            self.error(
                name,
                format!("Ensure this field has no more than {max_len} characters."),
            );
            return None;
        }
        Some(value.to_string())
    }
}

const DATETIME_FORMAT: &str = "Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].";

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `YYYY-MM-DD[T ]hh:mm[:ss[.f]]` with an optional `Z` or numeric offset.
/// Timestamps without an offset are taken as UTC.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = match text.as_bytes().get(10) {
        Some(b' ') => format!("{}T{}", &text[..10], &text[11..]),
        _ => text.to_string(),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Some(local) = text.strip_suffix(['Z', 'z']) {
        return parse_naive(local);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M%#z"] {
        if let Ok(parsed) = DateTime::parse_from_str(&text, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    parse_naive(&text)
}

fn parse_naive(text: &str) -> Option<DateTime<Utc>> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .into_iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// Parses a detail-route path segment. Anything that is not a positive
/// integer is treated the same as a missing record.
pub fn parse_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id > 0)
}
