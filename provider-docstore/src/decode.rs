//! Fail-closed typed decoding of store documents.
//!
//! A missing or mistyped field decodes to its default and is logged at
//! `warn`. Only a document with no derivable identifier is dropped.
//!
//! | record        | identifier                        | fields |
//! |---------------|-----------------------------------|--------|
//! | content item  | last segment of `name`            | `id`, `name`, `audioPath`, `imagePath`, `size` or `duration`, `popularity`, `isFree`, `createdAt` |
//! | translation   | `id`, else a numeric document id  | `field`, one string per locale code |
//! | audio locale  | `id`, else a numeric document id  | one asset path per locale code |

use crate::types::{parse_rfc3339_millis, Document, Value};
use bridge_traits::{
    ContentKind, Locale, RemoteAudioLocale, RemoteContentItem, RemoteTranslation,
    TranslationField,
};
use std::collections::BTreeMap;
use tracing::warn;

pub const FIELD_ID: &str = "id";
pub const FIELD_NAME: &str = "name";
pub const FIELD_AUDIO_PATH: &str = "audioPath";
pub const FIELD_IMAGE_PATH: &str = "imagePath";
pub const FIELD_POPULARITY: &str = "popularity";
pub const FIELD_IS_FREE: &str = "isFree";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_TRANSLATED_FIELD: &str = "field";

/// Tracks report a file size, stories a running time
pub fn size_field(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Track => "size",
        ContentKind::Story => "duration",
    }
}

/// Decode one content item document.
///
/// Returns `None` only when the document name yields no id.
pub fn content_item(doc: &Document, kind: ContentKind) -> Option<RemoteContentItem> {
    let Some(document_id) = doc.id() else {
        warn!(kind = %kind, "Dropping content document without an id");
        return None;
    };
    let fields = FieldReader::new(doc, document_id);

    let created_at = fields
        .timestamp_millis(FIELD_CREATED_AT)
        .or_else(|| doc.create_time.as_deref().and_then(parse_rfc3339_millis))
        .unwrap_or_default();

    Some(RemoteContentItem {
        document_id: document_id.to_string(),
        local_id: fields.integer(FIELD_ID),
        kind,
        display_name_fallback: fields.text(FIELD_NAME),
        asset_path: fields.text(FIELD_AUDIO_PATH),
        image_path: fields.text(FIELD_IMAGE_PATH),
        size_or_duration: fields.text(size_field(kind)),
        popularity_count: fields.integer(FIELD_POPULARITY),
        is_free: fields.boolean(FIELD_IS_FREE),
        created_at,
    })
}

/// Decode one translation document.
pub fn translation(doc: &Document) -> Option<RemoteTranslation> {
    let document_id = doc.id().unwrap_or_default();
    let id = cross_reference_id(doc, document_id)?;
    let fields = FieldReader::new(doc, document_id);

    let field = match fields.optional_text(FIELD_TRANSLATED_FIELD) {
        Some(raw) => TranslationField::parse(raw.trim()).unwrap_or_else(|| {
            warn!(document_id, value = %raw, "Unknown translated field, using name");
            TranslationField::Name
        }),
        None => TranslationField::Name,
    };

    Some(RemoteTranslation {
        id,
        field,
        texts: fields.per_locale(),
    })
}

/// Decode one audio-locale document.
pub fn audio_locale(doc: &Document) -> Option<RemoteAudioLocale> {
    let document_id = doc.id().unwrap_or_default();
    let id = cross_reference_id(doc, document_id)?;
    let fields = FieldReader::new(doc, document_id);

    Some(RemoteAudioLocale {
        id,
        assets: fields.per_locale(),
    })
}

/// The `id` field, falling back to a numeric document id
fn cross_reference_id(doc: &Document, document_id: &str) -> Option<i64> {
    if let Some(id) = doc.field(FIELD_ID).and_then(Value::as_i64) {
        return Some(id);
    }
    match document_id.parse::<i64>() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(document_id, "Dropping child document without a cross-reference id");
            None
        }
    }
}

/// Typed accessors over one document's fields
struct FieldReader<'a> {
    doc: &'a Document,
    document_id: &'a str,
}

impl<'a> FieldReader<'a> {
    fn new(doc: &'a Document, document_id: &'a str) -> Self {
        Self { doc, document_id }
    }

    fn lookup(&self, field: &str) -> Option<&'a Value> {
        match self.doc.field(field) {
            Some(value) if !value.is_null() => Some(value),
            _ => {
                warn!(document_id = self.document_id, field, "Missing field, using default");
                None
            }
        }
    }

    fn mistyped(&self, field: &str, expected: &str, value: &Value) {
        warn!(
            document_id = self.document_id,
            field,
            expected,
            found = value.type_name(),
            "Mistyped field, using default"
        );
    }

    fn text(&self, field: &str) -> String {
        let Some(value) = self.lookup(field) else {
            return String::new();
        };
        value.as_text().unwrap_or_else(|| {
            self.mistyped(field, "string", value);
            String::new()
        })
    }

    /// Absent fields are expected and not logged
    fn optional_text(&self, field: &str) -> Option<String> {
        let value = self.doc.field(field).filter(|value| !value.is_null())?;
        let text = value.as_text();
        if text.is_none() {
            self.mistyped(field, "string", value);
        }
        text
    }

    fn integer(&self, field: &str) -> i64 {
        let Some(value) = self.lookup(field) else {
            return 0;
        };
        value.as_i64().unwrap_or_else(|| {
            self.mistyped(field, "integer", value);
            0
        })
    }

    fn boolean(&self, field: &str) -> bool {
        let Some(value) = self.lookup(field) else {
            return false;
        };
        value.as_bool().unwrap_or_else(|| {
            self.mistyped(field, "boolean", value);
            false
        })
    }

    /// `None` lets the caller pick its own fallback
    fn timestamp_millis(&self, field: &str) -> Option<i64> {
        let value = self.doc.field(field).filter(|value| !value.is_null())?;
        let millis = value.as_timestamp_millis().or_else(|| value.as_i64());
        if millis.is_none() {
            self.mistyped(field, "timestamp", value);
        }
        millis
    }

    fn per_locale(&self) -> BTreeMap<Locale, String> {
        Locale::ALL
            .iter()
            .filter_map(|locale| {
                self.optional_text(locale.code())
                    .map(|text| (*locale, text))
            })
            .collect()
    }
}
