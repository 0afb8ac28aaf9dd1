//! Document <-> row conversion
//!
//! Every collection table has a single column named `_json_`. In `map` format it
//! holds a typed [`Value::Map`] that round-trips losslessly; in `text` format it
//! holds a JSON string in which 64-bit integers are written as
//! `{"$numberLong": "<n>"}` and any type other than int, long, string, array or
//! document degrades to its display string.

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as Json};

use super::filter::identity;
use crate::error::{DbError, DbResult};
use crate::storage::{ColumnKind, ColumnSpec, Row, Value};

/// Name of the storage column holding the document
pub const DOCUMENT_COLUMN: &str = "_json_";

const NUMBER_LONG: &str = "$numberLong";

/// How documents are laid out in the storage column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    #[default]
    Map,
    Text,
}

impl StorageFormat {
    pub fn column(self) -> ColumnSpec {
        let kind = match self {
            StorageFormat::Map => ColumnKind::Map,
            StorageFormat::Text => ColumnKind::Text,
        };
        ColumnSpec::new(DOCUMENT_COLUMN, kind)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StorageFormat::Map => "map",
            StorageFormat::Text => "text",
        }
    }
}

impl std::str::FromStr for StorageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "map" => Ok(StorageFormat::Map),
            "text" | "string" => Ok(StorageFormat::Text),
            other => Err(format!("unknown storage format '{}'", other)),
        }
    }
}

/// Serialize a document into a row for `column`, tagging it with its identity
pub fn to_row(doc: &Document, column: &ColumnSpec) -> DbResult<Row> {
    let value = match column.kind {
        ColumnKind::Map => Value::Map(document_to_entries(doc)),
        ColumnKind::Text => Value::String(document_to_json(doc).to_string()),
        ColumnKind::Other => {
            return Err(DbError::TypeMismatch(format!(
                "column '{}' cannot hold documents",
                column.name
            )))
        }
    };
    Ok(Row::new(identity(doc), value))
}

/// Rebuild the document stored in a row
pub fn to_document(row: &Row) -> DbResult<Document> {
    match &row.value {
        Value::Map(entries) => Ok(entries_to_document(entries)),
        Value::String(text) => {
            let json: Json = serde_json::from_str(text)
                .map_err(|e| DbError::InvalidRow(format!("row {}: {}", row.id, e)))?;
            match json_to_bson(json) {
                Bson::Document(doc) => Ok(doc),
                other => Err(DbError::InvalidRow(format!(
                    "row {} holds {:?} instead of a document",
                    row.id,
                    other.element_type()
                ))),
            }
        }
        other => Err(DbError::InvalidRow(format!(
            "row {} holds a {:?} value",
            row.id,
            other.kind()
        ))),
    }
}

fn document_to_entries(doc: &Document) -> Vec<(String, Value)> {
    doc.iter()
        .map(|(k, v)| (k.clone(), bson_to_value(v)))
        .collect()
}

fn bson_to_value(bson: &Bson) -> Value {
    match bson {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Boolean(*b),
        Bson::Int32(v) => Value::Int(*v),
        Bson::Int64(v) => Value::Long(*v),
        Bson::Double(v) => Value::Double(*v),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Binary(bin) => Value::Binary(u8::from(bin.subtype), bin.bytes.clone()),
        Bson::ObjectId(oid) => Value::ObjectId(oid.bytes()),
        Bson::DateTime(dt) => Value::DateTime(dt.timestamp_millis()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_value).collect()),
        Bson::Document(doc) => Value::Map(document_to_entries(doc)),
        other => Value::String(other.to_string()),
    }
}

fn entries_to_document(entries: &[(String, Value)]) -> Document {
    entries
        .iter()
        .map(|(k, v)| (k.clone(), value_to_bson(v)))
        .collect()
}

fn value_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Boolean(b) => Bson::Boolean(*b),
        Value::Int(v) => Bson::Int32(*v),
        Value::Long(v) => Bson::Int64(*v),
        Value::Double(v) => Bson::Double(*v),
        Value::String(s) => Bson::String(s.clone()),
        Value::Binary(subtype, bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::from(*subtype),
            bytes: bytes.clone(),
        }),
        Value::ObjectId(bytes) => Bson::ObjectId(ObjectId::from_bytes(*bytes)),
        Value::DateTime(millis) => Bson::DateTime(bson::DateTime::from_millis(*millis)),
        Value::Array(items) => Bson::Array(items.iter().map(value_to_bson).collect()),
        Value::Map(entries) => Bson::Document(entries_to_document(entries)),
    }
}

fn document_to_json(doc: &Document) -> Json {
    let map: JsonMap<String, Json> = doc
        .iter()
        .map(|(k, v)| (k.clone(), bson_to_json(v)))
        .collect();
    Json::Object(map)
}

fn bson_to_json(bson: &Bson) -> Json {
    match bson {
        Bson::Int32(v) => Json::from(*v),
        Bson::Int64(v) => {
            let mut map = JsonMap::new();
            map.insert(NUMBER_LONG.to_string(), Json::String(v.to_string()));
            Json::Object(map)
        }
        Bson::String(s) => Json::String(s.clone()),
        Bson::Array(items) => Json::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => document_to_json(doc),
        other => Json::String(other.to_string()),
    }
}

fn json_to_bson(json: Json) -> Bson {
    match json {
        Json::Null => Bson::Null,
        Json::Bool(b) => Bson::Boolean(b),
        Json::Number(n) => match n.as_i64() {
            Some(v) => match i32::try_from(v) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(v),
            },
            None => Bson::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Bson::String(s),
        Json::Array(items) => Bson::Array(items.into_iter().map(json_to_bson).collect()),
        Json::Object(map) => {
            if map.len() == 1 {
                if let Some(Json::String(digits)) = map.get(NUMBER_LONG) {
                    if let Ok(v) = digits.parse::<i64>() {
                        return Bson::Int64(v);
                    }
                }
            }
            Bson::Document(map.into_iter().map(|(k, v)| (k, json_to_bson(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn rich_document() -> Document {
        let blob = Binary {
            subtype: BinarySubtype::Generic,
            bytes: vec![1, 2, 3],
        };
        let oid = ObjectId::from_bytes([9u8; 12]);
        let when = bson::DateTime::from_millis(1_700_000_000_000);
        doc! {
            "_id": 7i32,
            "long": 9_000_000_000i64,
            "pi": 3.5,
            "flag": false,
            "none": Bson::Null,
            "name": "alpha",
            "blob": blob,
            "oid": oid,
            "when": when,
            "list": [1i32, "two", { "three": 3i64 }],
            "nested": { "inner": { "deep": true } },
        }
    }

    #[test]
    fn test_map_format_is_lossless() {
        let doc = rich_document();
        let row = to_row(&doc, &StorageFormat::Map.column()).unwrap();
        assert_eq!(row.key, Some(7));
        assert!(matches!(row.value, Value::Map(_)));
        assert_eq!(to_document(&row).unwrap(), doc);
    }

    #[test]
    fn test_map_format_degrades_exotic_types() {
        let doc = doc! { "ts": Bson::Timestamp(bson::Timestamp { time: 1, increment: 2 }) };
        let row = to_row(&doc, &StorageFormat::Map.column()).unwrap();
        let back = to_document(&row).unwrap();
        assert!(matches!(back.get("ts"), Some(Bson::String(_))));
    }

    #[test]
    fn test_text_format_keeps_ints_longs_and_strings() {
        let doc = doc! {
            "_id": 9_000_000_000i64,
            "f1": 2i32,
            "name": "x",
            "nested": { "n": 1i64 },
            "list": [1i32, "a"],
        };
        let row = to_row(&doc, &StorageFormat::Text.column()).unwrap();
        assert_eq!(row.key, Some(9_000_000_000));
        let text = row.value.as_str().unwrap();
        assert!(text.contains("\"$numberLong\":\"9000000000\""));
        assert_eq!(to_document(&row).unwrap(), doc);
    }

    #[test]
    fn test_text_format_degrades_other_values() {
        let doc = doc! { "flag": true, "pi": 1.5 };
        let row = to_row(&doc, &StorageFormat::Text.column()).unwrap();
        let back = to_document(&row).unwrap();
        assert_eq!(back.get_str("flag").unwrap(), "true");
        assert_eq!(back.get_str("pi").unwrap().parse::<f64>().unwrap(), 1.5);
    }

    #[test]
    fn test_rows_without_integral_identity_are_unkeyed() {
        let column = StorageFormat::Map.column();
        assert_eq!(to_row(&doc! { "_id": "k" }, &column).unwrap().key, None);
        assert_eq!(to_row(&doc! { "v": 1i32 }, &column).unwrap().key, None);
    }

    #[test]
    fn test_storage_format_parsing() {
        assert_eq!("MAP".parse::<StorageFormat>().unwrap(), StorageFormat::Map);
        assert_eq!("text".parse::<StorageFormat>().unwrap(), StorageFormat::Text);
        assert!("xml".parse::<StorageFormat>().is_err());
        assert_eq!(StorageFormat::Text.column().name, DOCUMENT_COLUMN);
        assert_eq!(StorageFormat::Text.column().kind, ColumnKind::Text);
    }

    #[test]
    fn test_invalid_rows() {
        let row = Row::new(None, Value::String("not json".to_string()));
        assert!(matches!(to_document(&row), Err(DbError::InvalidRow(_))));
        let row = Row::new(None, Value::Int(3));
        assert!(matches!(to_document(&row), Err(DbError::InvalidRow(_))));
    }
}
