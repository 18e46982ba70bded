//! Benchmark configuration: the YAML source list and the runner settings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::array::Chunking;
use crate::error::{BenchError, ConfigError};
use crate::glob::matches_filter;
use crate::operation::{canonical_operation_name, operation_by_name};
use crate::source::source_types;

/// Default number of timed repeats per (source, operation) pair.
pub const DEFAULT_REPEATS: usize = 3;

/// Settings for the benchmark runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Timed repeats per compatible operation.
    pub repeats: usize,
    /// Only benchmark sources whose name matches this pattern.
    pub filter: Option<String>,
    /// Print per-repeat progress to stderr.
    pub verbose: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            repeats: DEFAULT_REPEATS,
            filter: None,
            verbose: true,
        }
    }
}

impl RunnerConfig {
    /// Create a new config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from environment variables.
    ///
    /// Supported variables:
    /// - `BENCH_REPEATS`: timed repeats (default: 3)
    /// - `BENCH_FILTER`: filter sources by name
    /// - `BENCH_VERBOSE`: verbose output (default: true)
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("BENCH_REPEATS") {
            if let Ok(n) = v.parse() {
                cfg.repeats = n;
            }
        }
        if let Ok(v) = std::env::var("BENCH_FILTER") {
            cfg.filter = Some(v);
        }
        if let Ok(v) = std::env::var("BENCH_VERBOSE") {
            cfg.verbose = v != "0" && !v.eq_ignore_ascii_case("false");
        }

        cfg
    }

    /// Set the number of timed repeats.
    pub fn repeats(mut self, n: usize) -> Self {
        self.repeats = n;
        self
    }

    /// Set filter pattern.
    pub fn filter(mut self, pattern: impl Into<String>) -> Self {
        self.filter = Some(pattern.into());
        self
    }

    /// Set verbose output.
    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }

    /// Whether a source with this name passes the filter.
    pub fn should_run(&self, source_name: &str) -> bool {
        match &self.filter {
            Some(pattern) => matches_filter(source_name, pattern),
            None => true,
        }
    }
}

/// Per-source restriction on which operations may run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationFilter {
    /// Allow-list of operation identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only: Option<Vec<String>>,
}

impl OperationFilter {
    /// Whether `operation` passes the allow-list. No list allows everything.
    pub fn allows(&self, operation: &str) -> bool {
        self.only
            .as_ref()
            .map_or(true, |only| only.iter().any(|o| canonical_operation_name(o) == operation))
    }
}

/// One entry of the `sources` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Selects the source implementation.
    #[serde(rename = "type")]
    pub source_type: String,

    /// Chunking variants to benchmark; absent means a single `auto` run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<Chunking>>,

    /// Type-specific arguments.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operations: Option<OperationFilter>,

    /// Explicit identity; otherwise derived from the entry's content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SourceConfig {
    /// An entry of the given type with no other settings.
    pub fn new(source_type: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            chunks: None,
            args: Map::new(),
            operations: None,
            name: None,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_chunks(mut self, chunks: Vec<Chunking>) -> Self {
        self.chunks = Some(chunks);
        self
    }

    pub fn with_only(mut self, operations: &[&str]) -> Self {
        self.operations = Some(OperationFilter {
            only: Some(operations.iter().map(|s| s.to_string()).collect()),
        });
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The chunking variants this entry expands into.
    pub fn chunk_variants(&self) -> Vec<Chunking> {
        self.chunks.clone().unwrap_or_else(|| vec![Chunking::Auto])
    }

    /// Serialize with object keys sorted, so equal entries give equal text.
    pub fn canonical_json(&self) -> Result<String, ConfigError> {
        // `serde_json::Map` is ordered by key, so going through `Value` sorts
        // struct fields and nested mappings alike.
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string(&value)?)
    }

    /// 64-bit content digest (hex) of the canonical serialization.
    pub fn digest(&self) -> Result<String, ConfigError> {
        let hash = Sha256::digest(self.canonical_json()?.as_bytes());
        Ok(hash[..8].iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// The source name: explicit when configured, else the content digest.
    pub fn resolved_name(&self) -> Result<String, ConfigError> {
        match &self.name {
            Some(name) => Ok(name.clone()),
            None => self.digest(),
        }
    }

    fn validate(&self, index: usize) -> Result<(), BenchError> {
        let invalid = |msg: String| ConfigError::Invalid(format!("sources[{}]: {}", index, msg));

        if self.source_type.trim().is_empty() {
            return Err(invalid("'type' must not be empty".to_string()).into());
        }
        if !source_types().any(|t| t == self.source_type) {
            return Err(BenchError::UnknownSourceType(self.source_type.clone()));
        }
        if let Some(chunks) = &self.chunks {
            if chunks.is_empty() {
                return Err(invalid("'chunks' must list at least one entry".to_string()).into());
            }
            for chunking in chunks {
                chunking.validate().map_err(|e| invalid(e.to_string()))?;
            }
        }
        if let Some(only) = self.operations.as_ref().and_then(|o| o.only.as_ref()) {
            for op in only {
                operation_by_name(op)?;
            }
        }
        Ok(())
    }
}

/// A benchmark configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl BenchConfig {
    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Check the document beyond what its structure enforces.
    ///
    /// Runs before any source is constructed.
    pub fn validate(&self) -> Result<(), BenchError> {
        for (index, source) in self.sources.iter().enumerate() {
            source.validate(index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
sources:
  - type: Random
    args:
      shape: [365, 50]
    chunks:
      - auto
      - {time: -1, lat: 10}
  - type: Random
    name: small
    args: {shape: [10, 5]}
    operations:
      only: [TimeMean]
"#;

    #[test]
    fn should_use_defaults_when_env_not_set() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.repeats, 3);
        assert!(cfg.filter.is_none());
        assert!(cfg.verbose);
    }

    #[test]
    fn should_build_config_with_builder() {
        let cfg = RunnerConfig::new().repeats(5).verbose(false).filter("rand*");

        assert_eq!(cfg.repeats, 5);
        assert!(!cfg.verbose);
        assert!(cfg.should_run("random-small"));
        assert!(!cfg.should_run("files"));
    }

    #[test]
    fn should_parse_sources_from_yaml() {
        let cfg = BenchConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.sources[0].chunk_variants().len(), 2);
        assert_eq!(cfg.sources[1].chunk_variants(), vec![Chunking::Auto]);
        assert_eq!(cfg.sources[1].name.as_deref(), Some("small"));
        cfg.validate().unwrap();
    }

    #[test]
    fn should_reject_unknown_keys() {
        let err = BenchConfig::from_yaml_str("sources:\n  - type: Random\n    shape: [1]\n");
        assert!(matches!(err, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn should_reject_missing_type() {
        let err = BenchConfig::from_yaml_str("sources:\n  - args: {shape: [1]}\n");
        assert!(err.is_err());
    }

    #[test]
    fn should_reject_unknown_operation_in_allow_list() {
        let cfg = BenchConfig {
            sources: vec![SourceConfig::new("Random").with_only(&["Median"])],
        };
        assert!(matches!(
            cfg.validate(),
            Err(BenchError::UnknownOperationType(op)) if op == "Median"
        ));
    }

    #[test]
    fn should_reject_unregistered_source_type() {
        let cfg = BenchConfig {
            sources: vec![
                SourceConfig::new("Random").with_arg("shape", vec![4]),
                SourceConfig::new("Zarr"),
            ],
        };
        assert!(matches!(
            cfg.validate(),
            Err(BenchError::UnknownSourceType(t)) if t == "Zarr"
        ));
    }

    #[test]
    fn should_reject_empty_chunk_list() {
        let cfg = BenchConfig {
            sources: vec![SourceConfig::new("Random").with_chunks(vec![])],
        };
        assert!(matches!(cfg.validate(), Err(BenchError::Config(_))));
    }

    #[test]
    fn should_give_identical_digest_for_identical_config() {
        let a = BenchConfig::from_yaml_str(SAMPLE).unwrap();
        let b = BenchConfig::from_yaml_str(SAMPLE).unwrap();
        let digest = a.sources[0].digest().unwrap();
        assert_eq!(digest, b.sources[0].digest().unwrap());
        assert_eq!(digest.len(), 16);
    }

    #[test]
    fn should_ignore_key_order_when_hashing() {
        let a = SourceConfig::new("Random")
            .with_arg("shape", vec![10, 5])
            .with_arg("seed", 1);
        let b = SourceConfig::new("Random")
            .with_arg("seed", 1)
            .with_arg("shape", vec![10, 5]);
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn should_give_distinct_digest_for_distinct_config() {
        let a = SourceConfig::new("Random").with_arg("shape", vec![10, 5]);
        let b = SourceConfig::new("Random").with_arg("shape", vec![10, 6]);
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn should_prefer_explicit_name() {
        let cfg = SourceConfig::new("Random").with_name("era5");
        assert_eq!(cfg.resolved_name().unwrap(), "era5");
    }

    #[test]
    fn should_allow_everything_without_only_list() {
        assert!(OperationFilter::default().allows("Climatology"));
        let filter = OperationFilter {
            only: Some(vec!["TimeMean".to_string()]),
        };
        assert!(filter.allows("TimeMean"));
        assert!(!filter.allows("Climatology"));
    }

    #[test]
    fn should_allow_operation_listed_under_alias() {
        let cfg = BenchConfig::from_yaml_str(
            r#"
sources:
  - type: Random
    args: {shape: [10]}
    operations: {only: [ClimatologyClimtas]}
"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        let filter = cfg.sources[0].operations.clone().unwrap_or_default();
        assert!(filter.allows("ClimatologyBlocked"));
        assert!(!filter.allows("Climatology"));
    }
}
