use serde::Deserialize;
use std::path::PathBuf;

use crate::host::static_host::StaticHostConfig;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub script: ScriptConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Canned sources and stored queries for the CLI's static host.
    #[serde(default)]
    pub host: StaticHostConfig,
}

/// Sandbox policy knobs. The comma-separated string form is the operator
/// surface; accessors hand out the parsed lists.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScriptConfig {
    /// Modules scripts may import (comma-separated, exact-match)
    #[serde(default)]
    pub allowed_import_modules: String,
    /// Extra search roots for declarative modules (comma-separated paths)
    #[serde(default)]
    pub additional_modules_paths: String,
    /// Extended-catalog builtins to enable (comma-separated names)
    #[serde(default)]
    pub additional_builtins: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionConfig {
    /// Hard deadline enforced by the CLI supervisor, not by the sandbox.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Split a comma-separated config value: trim, drop blanks, deduplicate
/// preserving first-appearance order.
fn split_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in raw.split(',') {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|existing| existing == item) {
            out.push(item.to_string());
        }
    }
    out
}

impl ScriptConfig {
    pub fn allowed_modules(&self) -> Vec<String> {
        split_list(&self.allowed_import_modules)
    }

    pub fn module_roots(&self) -> Vec<PathBuf> {
        split_list(&self.additional_modules_paths)
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }

    pub fn extra_builtins(&self) -> Vec<String> {
        split_list(&self.additional_builtins)
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Expand environment variables like ${QUARRY_MODULES_DIR}
        let expanded = shellexpand::env(&content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_drops_blanks() {
        assert_eq!(
            split_list(" math, strings ,,  "),
            vec!["math".to_string(), "strings".to_string()]
        );
        assert!(split_list("").is_empty());
        assert!(split_list(" , ,").is_empty());
    }

    #[test]
    fn test_split_list_deduplicates_preserving_order() {
        assert_eq!(
            split_list("b,a,b,a"),
            vec!["b".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.script.allowed_modules().is_empty());
        assert!(config.script.module_roots().is_empty());
        assert!(config.script.extra_builtins().is_empty());
        assert_eq!(config.execution.timeout_secs, 30);
        assert!(config.host.sources.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let config: Config = toml::from_str(
            r#"
            [script]
            allowed_import_modules = "math,strings"
            additional_modules_paths = "./modules"
            additional_builtins = "divmod"

            [execution]
            timeout_secs = 5

            [[host.sources]]
            name = "events"

            [[host.sources.results]]
            query = "select 1"
            columns = [{ name = "x", dtype = "int" }]
            rows = [[1]]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.script.allowed_modules(),
            vec!["math".to_string(), "strings".to_string()]
        );
        assert_eq!(config.script.module_roots(), vec![PathBuf::from("./modules")]);
        assert_eq!(config.execution.timeout_secs, 5);
        assert_eq!(config.host.sources[0].name, "events");
    }

    #[test]
    fn test_load_expands_environment_variables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quarry.toml");
        std::env::set_var("QUARRY_TEST_MODULES", "mod_a,mod_b");
        std::fs::write(
            &path,
            "[script]\nallowed_import_modules = \"${QUARRY_TEST_MODULES}\"\n",
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(
            config.script.allowed_modules(),
            vec!["mod_a".to_string(), "mod_b".to_string()]
        );
    }
}
