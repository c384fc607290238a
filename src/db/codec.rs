//! Textual encoding of structured alert fields.
//!
//! Lists and `raw_data` are stored as canonical JSON text. Decoding is a
//! bounded, shape-checked JSON parse: an array of strings for list fields,
//! an object for `raw_data`, RFC 3339 for dates. Stored text is data only and
//! is never evaluated; anything that does not match the expected shape
//! (including legacy Python-repr rows such as `['a', 'b']`) is rejected
//! with a [`SerializationError`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SerializationError;
use crate::models::{Alert, PublishedDate, RawRecord};

/// Upper bound on the length of one encoded field.
pub const MAX_ENCODED_LEN: usize = 4 * 1024 * 1024;

pub const FIELD_AFFECTED_PRODUCTS: &str = "affected_products";
pub const FIELD_RECOMMENDATIONS: &str = "recommendations";
pub const FIELD_RAW_DATA: &str = "raw_data";
pub const FIELD_DATE_PUBLISHED: &str = "date_published";
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Storage form of an [`Alert`]: every column is text or NULL.
///
/// Both backends persist exactly this shape; the hosted store sends it as
/// the JSON row body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedAlert {
    pub alert_id: String,
    pub title: String,
    pub date_published: Option<String>,
    pub severity: String,
    pub summary: String,
    pub affected_products: String,
    pub recommendations: String,
    pub source_url: String,
    pub source_name: String,
    pub raw_data: String,
}

impl EncodedAlert {
    pub fn encode(alert: &Alert) -> Result<Self, SerializationError> {
        let id = alert.alert_id.as_str();
        Ok(Self {
            alert_id: alert.alert_id.clone(),
            title: alert.title.clone(),
            date_published: alert.date_published.to_storage(),
            severity: alert.severity.clone(),
            summary: alert.summary.clone(),
            affected_products: encode_list(id, FIELD_AFFECTED_PRODUCTS, &alert.affected_products)?,
            recommendations: encode_list(id, FIELD_RECOMMENDATIONS, &alert.recommendations)?,
            source_url: alert.source_url.clone(),
            source_name: alert.source_name.clone(),
            raw_data: encode_map(id, FIELD_RAW_DATA, &alert.raw_data)?,
        })
    }

    /// Inverse of [`EncodedAlert::encode`]; the first field that fails strict
    /// decoding is reported.
    pub fn decode(self) -> Result<Alert, SerializationError> {
        let id = self.alert_id.as_str();
        let date_published = decode_published(id, self.date_published.as_deref())?;
        let affected_products = decode_list(id, FIELD_AFFECTED_PRODUCTS, &self.affected_products)?;
        let recommendations = decode_list(id, FIELD_RECOMMENDATIONS, &self.recommendations)?;
        let raw_data = decode_map(id, FIELD_RAW_DATA, &self.raw_data)?;
        Ok(Alert {
            alert_id: self.alert_id,
            title: self.title,
            date_published,
            severity: self.severity,
            summary: self.summary,
            affected_products,
            recommendations,
            source_url: self.source_url,
            source_name: self.source_name,
            raw_data,
        })
    }
}

pub fn encode_list(
    record: &str,
    field: &'static str,
    items: &[String],
) -> Result<String, SerializationError> {
    let text = serde_json::to_string(items)
        .map_err(|e| SerializationError::new(record, field, e.to_string()))?;
    check_len(record, field, &text)?;
    Ok(text)
}

pub fn encode_map(
    record: &str,
    field: &'static str,
    map: &RawRecord,
) -> Result<String, SerializationError> {
    let text = serde_json::to_string(map)
        .map_err(|e| SerializationError::new(record, field, e.to_string()))?;
    check_len(record, field, &text)?;
    Ok(text)
}

/// Decode a JSON array of strings, preserving order.
pub fn decode_list(
    record: &str,
    field: &'static str,
    text: &str,
) -> Result<Vec<String>, SerializationError> {
    check_len(record, field, text)?;
    serde_json::from_str::<Vec<String>>(text)
        .map_err(|e| SerializationError::new(record, field, format!("expected JSON array of strings: {e}")))
}

/// Decode a JSON object.
pub fn decode_map(
    record: &str,
    field: &'static str,
    text: &str,
) -> Result<RawRecord, SerializationError> {
    check_len(record, field, text)?;
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(SerializationError::new(
            record,
            field,
            format!("expected JSON object, found {}", json_kind(&other)),
        )),
        Err(e) => Err(SerializationError::new(
            record,
            field,
            format!("expected JSON object: {e}"),
        )),
    }
}

/// Decode a stored publication date; `None` is the unknown sentinel.
pub fn decode_published(
    record: &str,
    text: Option<&str>,
) -> Result<PublishedDate, SerializationError> {
    match text {
        None => Ok(PublishedDate::Unknown),
        Some(t) => decode_timestamp(record, FIELD_DATE_PUBLISHED, t).map(PublishedDate::Known),
    }
}

pub fn decode_timestamp(
    record: &str,
    field: &'static str,
    text: &str,
) -> Result<DateTime<Utc>, SerializationError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SerializationError::new(record, field, format!("expected RFC 3339 timestamp: {e}")))
}

fn check_len(record: &str, field: &'static str, text: &str) -> Result<(), SerializationError> {
    if text.len() > MAX_ENCODED_LEN {
        return Err(SerializationError::new(
            record,
            field,
            format!("encoded length {} exceeds {MAX_ENCODED_LEN} bytes", text.len()),
        ));
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
