//! Equality filters
//!
//! A filter is a plain document; a candidate matches when every filter key is
//! present in it with an exactly equal value (same BSON type and value). No
//! operator syntax is interpreted.

use bson::{Bson, Document};

use crate::storage::KeyRange;

/// Field holding a document's identity
pub const ID_FIELD: &str = "_id";

/// Integral identity of a document, if its `_id` is a 32- or 64-bit integer
pub fn identity(doc: &Document) -> Option<i64> {
    match doc.get(ID_FIELD) {
        Some(Bson::Int32(v)) => Some(*v as i64),
        Some(Bson::Int64(v)) => Some(*v),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Document,
}

impl Filter {
    pub fn new(conditions: Document) -> Self {
        Self { conditions }
    }

    /// Take the filter stored under `key` in a command; anything that is not a
    /// document counts as no filter
    pub fn from_command(command: &Document, key: &str) -> Self {
        match command.get(key) {
            Some(Bson::Document(doc)) => Self::new(doc.clone()),
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &Document {
        &self.conditions
    }

    /// The identity to look up when the filter is exactly `{_id: <integer>}`
    pub fn point_key(&self) -> Option<i64> {
        if self.conditions.len() == 1 {
            identity(&self.conditions)
        } else {
            None
        }
    }

    /// Index range for scanning candidates
    pub fn key_range(&self) -> KeyRange {
        match self.point_key() {
            Some(key) => KeyRange::point(key),
            None => KeyRange::all(),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(key, expected)| doc.get(key) == Some(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_identity_extraction() {
        assert_eq!(identity(&doc! { "_id": 5i32 }), Some(5));
        assert_eq!(identity(&doc! { "_id": 9_000_000_000i64 }), Some(9_000_000_000));
        assert_eq!(identity(&doc! { "_id": "5" }), None);
        assert_eq!(identity(&doc! { "_id": 5.0 }), None);
        assert_eq!(identity(&doc! { "v": 1i32 }), None);
    }

    #[test]
    fn test_point_key_requires_single_identity_key() {
        assert_eq!(Filter::new(doc! { "_id": 5i32 }).point_key(), Some(5));
        assert_eq!(
            Filter::new(doc! { "_id": 5i32 }).key_range(),
            KeyRange::point(5)
        );
        assert_eq!(Filter::new(doc! { "_id": 5i32, "v": "x" }).point_key(), None);
        assert_eq!(Filter::new(doc! { "_id": "x" }).point_key(), None);
        assert!(Filter::default().key_range().is_unbounded());
    }

    #[test]
    fn test_all_conditions_must_match() {
        let filter = Filter::new(doc! { "f1": 2i32, "f2": "a" });
        assert!(filter.matches(&doc! { "f1": 2i32, "f2": "a", "f3": true }));
        assert!(!filter.matches(&doc! { "f1": 2i32 }));
        assert!(!filter.matches(&doc! { "f1": 3i32, "f2": "a" }));
    }

    #[test]
    fn test_equality_is_type_strict() {
        let filter = Filter::new(doc! { "f1": 2i32 });
        assert!(!filter.matches(&doc! { "f1": 2i64 }));
        assert!(!filter.matches(&doc! { "f1": "2" }));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::default().matches(&doc! { "a": 1i32 }));
        assert!(Filter::from_command(&doc! { "find": "c1", "filter": 3i32 }, "filter").is_empty());
        assert!(!Filter::from_command(&doc! { "filter": { "a": 1i32 } }, "filter").is_empty());
    }
}
