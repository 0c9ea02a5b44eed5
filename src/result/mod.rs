//! The structured result a script builds up: ordered columns, rows, and a
//! log. Mutated only through the validated builder operations during the
//! single execution, then handed to the caller as-is.

pub mod frame;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::SandboxError;

use frame::Frame;

/// Closed enumeration of result column semantic types. The string forms are
/// part of the script-facing API (`TYPE_*` constants and `add_result_column`
/// type arguments) and of the serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    String,
    Date,
    Datetime,
}

impl ColumnType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "boolean" => Some(ColumnType::Boolean),
            "integer" => Some(ColumnType::Integer),
            "float" => Some(ColumnType::Float),
            "string" => Some(ColumnType::String),
            "date" => Some(ColumnType::Date),
            "datetime" => Some(ColumnType::Datetime),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::String => "string",
            ColumnType::Date => "date",
            ColumnType::Datetime => "datetime",
        }
    }
}

/// The `TYPE_*` constants exposed in the script namespace.
pub const TYPE_CONSTANTS: &[(&str, ColumnType)] = &[
    ("TYPE_BOOLEAN", ColumnType::Boolean),
    ("TYPE_INTEGER", ColumnType::Integer),
    ("TYPE_FLOAT", ColumnType::Float),
    ("TYPE_STRING", ColumnType::String),
    ("TYPE_DATE", ColumnType::Date),
    ("TYPE_DATETIME", ColumnType::Datetime),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub friendly_name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// One result row: column name → value, in insertion order. Names are keys
/// by convention only; no uniqueness is enforced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Vec<(String, serde_json::Value)>);

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// The live result of one execution. Starts empty, is mutated only through
/// the builder operations below, and becomes immutable once the execution
/// ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultObject {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub log: Vec<String>,
}

impl ResultObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Fails (leaving `columns` untouched) if `type_str`
    /// is not in the supported enumeration. Duplicate names are the
    /// caller's error to avoid.
    pub fn add_column(
        &mut self,
        name: &str,
        friendly_name: &str,
        type_str: &str,
    ) -> Result<(), SandboxError> {
        let column_type =
            ColumnType::parse(type_str).ok_or_else(|| SandboxError::column_type(type_str))?;
        self.columns.push(Column {
            name: name.to_string(),
            friendly_name: friendly_name.to_string(),
            column_type,
        });
        Ok(())
    }

    /// Append a full row mapping unconditionally. Row and column
    /// declarations are independent; no column-existence validation here.
    pub fn add_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Bulk-ingest a tabular frame: one inferred column per frame column
    /// (friendly name = column name), then every frame row appended in
    /// record orientation.
    pub fn ingest_frame(&mut self, frame: &Frame) -> Result<(), SandboxError> {
        for (idx, column) in frame.columns.iter().enumerate() {
            let inferred = frame.infer_column_type(idx);
            self.add_column(&column.name, &column.name, inferred.as_str())?;
        }
        for row in frame.record_rows() {
            self.add_row(row);
        }
        Ok(())
    }

    pub fn set_log(&mut self, lines: Vec<String>) {
        self.log = lines;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_add_column_appends_in_order() {
        let mut result = ResultObject::new();
        result.add_column("a", "A", "integer").unwrap();
        result.add_column("b", "B", "string").unwrap();
        let names: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_add_column_unknown_type_leaves_columns_unchanged() {
        let mut result = ResultObject::new();
        result.add_column("a", "A", "integer").unwrap();
        let before = result.columns.len();

        let err = result.add_column("b", "B", "decimal").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ColumnType);
        assert!(err.message.contains("'decimal'"));
        assert_eq!(result.columns.len(), before);
    }

    #[test]
    fn test_add_column_allows_duplicate_names() {
        let mut result = ResultObject::new();
        result.add_column("x", "X", "integer").unwrap();
        result.add_column("x", "X again", "float").unwrap();
        assert_eq!(result.columns.len(), 2);
    }

    #[test]
    fn test_add_row_is_unvalidated() {
        let mut result = ResultObject::new();
        // No columns declared — the row is appended anyway.
        result.add_row(Row(vec![("ghost".into(), serde_json::json!(1))]));
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn test_serialization_shape_and_order() {
        let mut result = ResultObject::new();
        result.add_column("x", "X", "integer").unwrap();
        result.add_row(Row(vec![
            ("b".into(), serde_json::json!(2)),
            ("a".into(), serde_json::json!(1)),
        ]));
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"columns":[{"name":"x","friendly_name":"X","type":"integer"}],"rows":[{"b":2,"a":1}],"log":[]}"#
        );
    }

    #[test]
    fn test_column_type_round_trip() {
        for (s, t) in [
            ("boolean", ColumnType::Boolean),
            ("integer", ColumnType::Integer),
            ("float", ColumnType::Float),
            ("string", ColumnType::String),
            ("date", ColumnType::Date),
            ("datetime", ColumnType::Datetime),
        ] {
            assert_eq!(ColumnType::parse(s), Some(t));
            assert_eq!(t.as_str(), s);
        }
        assert_eq!(ColumnType::parse("DATETIME"), None);
        assert_eq!(ColumnType::parse(""), None);
    }
}
