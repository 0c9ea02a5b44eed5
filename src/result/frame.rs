//! Tabular frames: the dtyped intermediate form host services hand back
//! for query results, and the input to bulk result ingestion.

use serde::Deserialize;

use super::{ColumnType, Row};

/// Physical column dtype as declared by the producing host service.
/// Deliberately coarser than [`ColumnType`]: the semantic type is inferred
/// at ingestion time, where the date/datetime split depends on the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Bool,
    Int,
    Float,
    Datetime,
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameColumn {
    pub name: String,
    pub dtype: Dtype,
}

/// A tabular result: dtyped columns and positional rows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub columns: Vec<FrameColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// String rendering of a cell as the inference heuristic sees it:
    /// strings render as their content, everything else as its JSON form.
    pub fn render_cell(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Infer the semantic [`ColumnType`] for the column at `idx`.
    ///
    /// Datetime columns split on the rendered length of the first value:
    /// more than 10 characters means a time component is present
    /// (`datetime`), otherwise a bare date. An empty frame defaults its
    /// datetime columns to `datetime`.
    pub fn infer_column_type(&self, idx: usize) -> ColumnType {
        match self.columns[idx].dtype {
            Dtype::Bool => ColumnType::Boolean,
            Dtype::Float => ColumnType::Float,
            Dtype::Int => ColumnType::Integer,
            Dtype::Datetime => {
                if self.rows.is_empty() {
                    ColumnType::Datetime
                } else {
                    let first = self.rows[0].get(idx).unwrap_or(&serde_json::Value::Null);
                    if Self::render_cell(first).chars().count() > 10 {
                        ColumnType::Datetime
                    } else {
                        ColumnType::Date
                    }
                }
            }
            Dtype::Other => ColumnType::String,
        }
    }

    /// Rows in record orientation: each positional row zipped with the
    /// column names, in column order. Short rows are padded with null.
    pub fn record_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|row| {
                Row(self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let value = row.get(idx).cloned().unwrap_or(serde_json::Value::Null);
                        (col.name.clone(), value)
                    })
                    .collect())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(dtype: Dtype, rows: Vec<Vec<serde_json::Value>>) -> Frame {
        Frame {
            columns: vec![FrameColumn {
                name: "c".into(),
                dtype,
            }],
            rows,
        }
    }

    #[test]
    fn test_plain_dtypes_map_directly() {
        assert_eq!(
            frame(Dtype::Bool, vec![vec![json!(true)]]).infer_column_type(0),
            ColumnType::Boolean
        );
        assert_eq!(
            frame(Dtype::Int, vec![vec![json!(1)]]).infer_column_type(0),
            ColumnType::Integer
        );
        assert_eq!(
            frame(Dtype::Float, vec![vec![json!(1.5)]]).infer_column_type(0),
            ColumnType::Float
        );
        assert_eq!(
            frame(Dtype::Other, vec![vec![json!("x")]]).infer_column_type(0),
            ColumnType::String
        );
    }

    #[test]
    fn test_datetime_ten_chars_is_date() {
        // Exactly 10 characters — a bare date.
        let f = frame(Dtype::Datetime, vec![vec![json!("2024-03-01")]]);
        assert_eq!(f.infer_column_type(0), ColumnType::Date);
    }

    #[test]
    fn test_datetime_eleven_chars_is_datetime() {
        let f = frame(Dtype::Datetime, vec![vec![json!("2024-03-01T")]]);
        assert_eq!(f.infer_column_type(0), ColumnType::Datetime);
    }

    #[test]
    fn test_datetime_full_timestamp_is_datetime() {
        let f = frame(Dtype::Datetime, vec![vec![json!("2024-03-01 10:30:00")]]);
        assert_eq!(f.infer_column_type(0), ColumnType::Datetime);
    }

    #[test]
    fn test_empty_frame_datetime_defaults_to_datetime() {
        let f = frame(Dtype::Datetime, vec![]);
        assert_eq!(f.infer_column_type(0), ColumnType::Datetime);
    }

    #[test]
    fn test_only_first_row_decides() {
        let f = frame(
            Dtype::Datetime,
            vec![vec![json!("2024-03-01")], vec![json!("2024-03-01 10:30:00")]],
        );
        assert_eq!(f.infer_column_type(0), ColumnType::Date);
    }

    #[test]
    fn test_record_rows_preserve_column_order() {
        let f = Frame {
            columns: vec![
                FrameColumn { name: "a".into(), dtype: Dtype::Int },
                FrameColumn { name: "b".into(), dtype: Dtype::Other },
            ],
            rows: vec![vec![json!(1), json!("x")], vec![json!(2)]],
        };
        let rows = f.record_rows();
        assert_eq!(rows[0].0[0], ("a".into(), json!(1)));
        assert_eq!(rows[0].0[1], ("b".into(), json!("x")));
        // Short row padded with null
        assert_eq!(rows[1].0[1], ("b".into(), serde_json::Value::Null));
    }

    #[test]
    fn test_ingest_into_result() {
        use crate::result::ResultObject;

        let f = Frame {
            columns: vec![
                FrameColumn { name: "day".into(), dtype: Dtype::Datetime },
                FrameColumn { name: "count".into(), dtype: Dtype::Int },
            ],
            rows: vec![vec![json!("2024-03-01"), json!(7)]],
        };
        let mut result = ResultObject::new();
        result.ingest_frame(&f).unwrap();
        assert_eq!(result.columns[0].column_type, ColumnType::Date);
        assert_eq!(result.columns[0].friendly_name, "day");
        assert_eq!(result.columns[1].column_type, ColumnType::Integer);
        assert_eq!(result.rows.len(), 1);
    }
}
