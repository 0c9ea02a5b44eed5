//! A config-defined host: canned sources, stored queries, and results.
//!
//! This is what the CLI wires in, and what the end-to-end tests run
//! against. Real deployments embed the sandbox and provide their own
//! [`HostServices`] implementation.

use serde::Deserialize;

use crate::result::frame::Frame;

use super::{HostError, HostServices, SchemaTable, SourceRef, StoredQuery, UserInfo};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StaticHostConfig {
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    #[serde(default)]
    pub queries: Vec<QueryEntry>,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub name: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub schema: Vec<SchemaTable>,
    /// Canned results, matched against incoming query text verbatim.
    #[serde(default)]
    pub results: Vec<CannedResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CannedResult {
    pub query: String,
    #[serde(flatten)]
    pub frame: Frame,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryEntry {
    pub id: i64,
    pub data_source: String,
    pub query: String,
    #[serde(default)]
    pub latest_result: Option<Frame>,
}

pub struct StaticHost {
    config: StaticHostConfig,
}

impl StaticHost {
    pub fn new(config: StaticHostConfig) -> Self {
        Self { config }
    }

    fn find_source(&self, source: &SourceRef) -> Result<&SourceEntry, HostError> {
        self.config
            .sources
            .iter()
            .find(|s| match source {
                SourceRef::Name(name) => &s.name == name,
                SourceRef::Id(id) => s.id == Some(*id),
            })
            .ok_or_else(|| HostError::new(format!("Wrong data source name/id: {source}.")))
    }
}

impl HostServices for StaticHost {
    fn get_query(&self, query_id: i64) -> Result<StoredQuery, HostError> {
        let entry = self
            .config
            .queries
            .iter()
            .find(|q| q.id == query_id)
            .ok_or_else(|| HostError::new(format!("Query id {query_id} does not exist.")))?;
        Ok(StoredQuery {
            id: entry.id,
            data_source: SourceRef::Name(entry.data_source.clone()),
            query_text: entry.query.clone(),
        })
    }

    fn get_query_result(&self, query_id: i64) -> Result<Frame, HostError> {
        let entry = self
            .config
            .queries
            .iter()
            .find(|q| q.id == query_id)
            .ok_or_else(|| HostError::new(format!("Query id {query_id} does not exist.")))?;
        entry
            .latest_result
            .clone()
            .ok_or_else(|| HostError::new("Query does not have results yet."))
    }

    fn run_query(&self, source: &SourceRef, query: &str) -> Result<Frame, HostError> {
        let entry = self.find_source(source)?;
        entry
            .results
            .iter()
            .find(|r| r.query == query)
            .map(|r| r.frame.clone())
            .ok_or_else(|| {
                HostError::new(format!(
                    "Data source '{}' returned no result for this query.",
                    entry.name
                ))
            })
    }

    fn get_schema(&self, source: &SourceRef) -> Result<Vec<SchemaTable>, HostError> {
        Ok(self.find_source(source)?.schema.clone())
    }

    fn current_user(&self) -> UserInfo {
        self.config.user.clone().unwrap_or(UserInfo {
            id: 1,
            name: "admin".to_string(),
            email: "admin@example.com".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::frame::{Dtype, FrameColumn};
    use serde_json::json;

    pub(crate) fn demo_config() -> StaticHostConfig {
        StaticHostConfig {
            sources: vec![SourceEntry {
                name: "events".into(),
                id: Some(7),
                schema: vec![SchemaTable {
                    name: "visits".into(),
                    columns: vec!["day".into(), "count".into()],
                }],
                results: vec![CannedResult {
                    query: "select day, count from visits".into(),
                    frame: Frame {
                        columns: vec![
                            FrameColumn { name: "day".into(), dtype: Dtype::Datetime },
                            FrameColumn { name: "count".into(), dtype: Dtype::Int },
                        ],
                        rows: vec![vec![json!("2024-03-01"), json!(12)]],
                    },
                }],
            }],
            queries: vec![QueryEntry {
                id: 3,
                data_source: "events".into(),
                query: "select day, count from visits".into(),
                latest_result: None,
            }],
            user: None,
        }
    }

    #[test]
    fn test_source_lookup_by_name_and_id() {
        let host = StaticHost::new(demo_config());
        assert!(host.find_source(&SourceRef::Name("events".into())).is_ok());
        assert!(host.find_source(&SourceRef::Id(7)).is_ok());

        let err = host.find_source(&SourceRef::Name("nope".into())).unwrap_err();
        assert_eq!(err.to_string(), "Wrong data source name/id: nope.");
    }

    #[test]
    fn test_run_query_returns_canned_frame() {
        let host = StaticHost::new(demo_config());
        let frame = host
            .run_query(&SourceRef::Name("events".into()), "select day, count from visits")
            .unwrap();
        assert_eq!(frame.rows.len(), 1);

        let err = host
            .run_query(&SourceRef::Name("events".into()), "select 1")
            .unwrap_err();
        assert!(err.to_string().contains("no result"));
    }

    #[test]
    fn test_missing_query_and_missing_result() {
        let host = StaticHost::new(demo_config());
        let err = host.get_query(99).unwrap_err();
        assert_eq!(err.to_string(), "Query id 99 does not exist.");

        let err = host.get_query_result(3).unwrap_err();
        assert_eq!(err.to_string(), "Query does not have results yet.");
    }

    #[test]
    fn test_default_user() {
        let host = StaticHost::new(StaticHostConfig::default());
        assert_eq!(host.current_user().name, "admin");
    }

    #[test]
    fn test_config_deserializes_from_toml() {
        let config: StaticHostConfig = toml::from_str(
            r#"
            [[sources]]
            name = "events"
            id = 7

            [[sources.results]]
            query = "select 1"
            columns = [{ name = "x", dtype = "int" }]
            rows = [[1]]

            [[queries]]
            id = 3
            data_source = "events"
            query = "select {{n}}"
            "#,
        )
        .unwrap();
        assert_eq!(config.sources[0].results[0].frame.rows, vec![vec![serde_json::json!(1)]]);
        assert_eq!(config.queries[0].id, 3);
    }
}
