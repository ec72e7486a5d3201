//! Document store REST response types
//!
//! Data structures for deserializing the `documents.list` responses of a
//! Firestore-style document store. Field values keep the store's one-of
//! encoding; [`crate::decode`] turns them into domain records.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Document store document resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name, `projects/{p}/databases/{d}/documents/{collection}/{id}`
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub fields: HashMap<String, Value>,

    /// Creation time (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,

    /// Last update time (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// Last segment of the resource name, if any
    pub fn id(&self) -> Option<&str> {
        self.name
            .rsplit('/')
            .next()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// `documents.list` response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    /// Absent when the collection is empty
    #[serde(default)]
    pub documents: Vec<Document>,

    /// Token for the next page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Integer encoding; the store sends 64-bit integers as strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntegerValue {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

/// Field value
///
/// Exactly one member is set for a well-formed value. Unknown value types
/// deserialize to a value with every member unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Value {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integer_value: Option<IntegerValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub double_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean_value: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub null_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_value: Option<MapValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_value: Option<ArrayValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn integer(value: i64) -> Self {
        Self {
            integer_value: Some(IntegerValue::Text(value.to_string())),
            ..Self::default()
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            boolean_value: Some(value),
            ..Self::default()
        }
    }

    pub fn timestamp(rfc3339: impl Into<String>) -> Self {
        Self {
            timestamp_value: Some(rfc3339.into()),
            ..Self::default()
        }
    }

    pub fn is_null(&self) -> bool {
        self.null_value.is_some()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.string_value.as_deref()
    }

    /// Integers, integral doubles and numeric strings
    pub fn as_i64(&self) -> Option<i64> {
        if let Some(integer) = &self.integer_value {
            return match integer {
                IntegerValue::Number(n) => Some(*n),
                IntegerValue::Text(text) => text.trim().parse().ok(),
                IntegerValue::Other(_) => None,
            };
        }
        if let Some(double) = self.double_value {
            if double.fract() == 0.0 && double.abs() < i64::MAX as f64 {
                return Some(double as i64);
            }
            return None;
        }
        self.string_value
            .as_deref()
            .and_then(|text| text.trim().parse().ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.boolean_value
    }

    /// Epoch milliseconds of a timestamp value, or of an RFC 3339 string
    pub fn as_timestamp_millis(&self) -> Option<i64> {
        self.timestamp_value
            .as_deref()
            .or(self.string_value.as_deref())
            .and_then(parse_rfc3339_millis)
    }

    /// Text rendering of scalar values
    pub fn as_text(&self) -> Option<String> {
        if let Some(text) = &self.string_value {
            return Some(text.clone());
        }
        if self.integer_value.is_some() {
            return self.as_i64().map(|n| n.to_string());
        }
        self.double_value.map(|d| d.to_string())
    }

    /// Name of the set member, for diagnostics
    pub fn type_name(&self) -> &'static str {
        if self.string_value.is_some() {
            "string"
        } else if self.integer_value.is_some() {
            "integer"
        } else if self.double_value.is_some() {
            "double"
        } else if self.boolean_value.is_some() {
            "boolean"
        } else if self.timestamp_value.is_some() {
            "timestamp"
        } else if self.null_value.is_some() {
            "null"
        } else if self.map_value.is_some() {
            "map"
        } else if self.array_value.is_some() {
            "array"
        } else {
            "unknown"
        }
    }
}

pub(crate) fn parse_rfc3339_millis(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.timestamp_millis())
}
