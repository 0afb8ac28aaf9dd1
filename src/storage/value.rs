use serde::{Deserialize, Serialize};

/// A typed cell value held by a table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Binary(u8, Vec<u8>),
    ObjectId([u8; 12]),
    DateTime(i64),
    Array(Vec<Value>),
    /// Ordered string-keyed map; insertion order is preserved
    Map(Vec<(String, Value)>),
}

impl Value {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Value::Map(_) => ColumnKind::Map,
            Value::String(_) => ColumnKind::Text,
            _ => ColumnKind::Other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }
}

/// Storage kind of a table's single document column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// `map<varchar, object>`
    Map,
    /// `varchar`
    Text,
    /// Only used to describe values that fit no column
    Other,
}

/// Definition of the single column every document table carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Row identifier assigned by the owning table
pub type RowId = u64;

/// One stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Assigned on `add_row`; zero until then
    pub id: RowId,
    /// Optional integer identity, indexed for point lookups
    pub key: Option<i64>,
    pub value: Value,
}

impl Row {
    pub fn new(key: Option<i64>, value: Value) -> Self {
        Self { id: 0, key, value }
    }
}

/// Bounds on the identity index; both `None` means a full scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub low: Option<i64>,
    pub high: Option<i64>,
}

impl KeyRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn point(key: i64) -> Self {
        Self {
            low: Some(key),
            high: Some(key),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }
}
