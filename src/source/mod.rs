//! Data sources and the factory that expands config entries into them.
//!
//! Source types are listed explicitly in [`SOURCE_TABLE`]. A config entry
//! names one by its `type` tag and expands into one source per chunking
//! variant.

mod mfdataset;
mod random;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::array::{Chunking, LazyArray};
use crate::config::SourceConfig;
use crate::error::{BenchError, ConfigError, Result};
use crate::result::SourceInfo;

pub use mfdataset::MfDataset;
pub use random::Random;

/// Identity and settings shared by every source type.
///
/// Fixed at construction.
#[derive(Debug, Clone)]
pub struct SourceCore {
    name: String,
    config: SourceConfig,
    chunking: Chunking,
}

impl SourceCore {
    pub fn new(config: SourceConfig, chunking: Chunking) -> Result<Self> {
        Ok(Self {
            name: config.resolved_name()?,
            config,
            chunking,
        })
    }

    /// Deserialize the entry's `args` into a type-specific struct.
    pub fn args<T: DeserializeOwned>(&self) -> Result<T> {
        parse_args(&self.config.source_type, &self.config.args)
    }
}

fn parse_args<T: DeserializeOwned>(source_type: &str, args: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|e| {
        ConfigError::Invalid(format!("bad args for {} source: {}", source_type, e)).into()
    })
}

/// Something that can produce a lazy array to benchmark.
pub trait Source: Send {
    fn core(&self) -> &SourceCore;

    /// Type tag, as used in config files and reported as `source_type`.
    fn type_name(&self) -> &'static str;

    /// Produce a fresh lazy array. Never cached by the harness.
    fn load(&self) -> Result<LazyArray>;

    fn name(&self) -> &str {
        &self.core().name
    }

    fn config(&self) -> &SourceConfig {
        &self.core().config
    }

    fn chunking(&self) -> &Chunking {
        &self.core().chunking
    }

    /// Describe the held data. Loads the array once.
    fn info(&self) -> Result<SourceInfo> {
        let array = self.load()?;
        Ok(SourceInfo {
            source_name: self.name().to_string(),
            source_type: self.type_name().to_string(),
            chunks: self.chunking().descriptor(array.dims()),
            nbytes: array.nbytes(),
        })
    }

    /// Load and fully reduce the data to prime any caches below the harness.
    fn warmup(&self) -> Result<()> {
        let array = self.load()?;
        array.compute_mean()?;
        Ok(())
    }

    /// Whether `operation` may be benchmarked against this source.
    fn is_compatible_with(&self, operation: &str) -> bool {
        self.config()
            .operations
            .as_ref()
            .map_or(true, |filter| filter.allows(operation))
    }
}

/// Builds a source of one type from its shared core.
pub type SourceConstructor = fn(SourceCore) -> Result<Box<dyn Source>>;

/// Registered source types.
pub const SOURCE_TABLE: &[(&str, SourceConstructor)] = &[
    (Random::TYPE_NAME, Random::from_core as SourceConstructor),
    (MfDataset::TYPE_NAME, MfDataset::from_core as SourceConstructor),
];

/// Type tags of every registered source type.
pub fn source_types() -> impl Iterator<Item = &'static str> {
    SOURCE_TABLE.iter().map(|(name, _)| *name)
}

fn lookup(source_type: &str) -> Result<SourceConstructor> {
    SOURCE_TABLE
        .iter()
        .find(|(name, _)| *name == source_type)
        .map(|(_, make)| *make)
        .ok_or_else(|| BenchError::UnknownSourceType(source_type.to_string()))
}

/// Expand one config entry into its chunking variants.
///
/// The type tag is resolved up front; sources are built lazily as the
/// returned iterator is advanced.
pub fn source_factory(config: &SourceConfig) -> Result<SourceVariants> {
    let constructor = lookup(&config.source_type)?;
    Ok(SourceVariants {
        constructor,
        config: config.clone(),
        chunks: config.chunk_variants().into_iter(),
    })
}

/// Lazy sequence of sources, one per chunking variant of a config entry.
pub struct SourceVariants {
    constructor: SourceConstructor,
    config: SourceConfig,
    chunks: std::vec::IntoIter<Chunking>,
}

impl Iterator for SourceVariants {
    type Item = Result<Box<dyn Source>>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunking = self.chunks.next()?;
        Some(SourceCore::new(self.config.clone(), chunking).and_then(self.constructor))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_entry() -> SourceConfig {
        SourceConfig::new("Random")
            .with_arg("shape", vec![20, 6])
            .with_chunks(vec![
                Chunking::Auto,
                Chunking::explicit([("time", 5)]),
                Chunking::explicit([("time", -1), ("lat", 2)]),
            ])
    }

    #[test]
    fn should_yield_one_source_per_chunking() {
        let entry = random_entry();
        let sources: Vec<_> = source_factory(&entry)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(sources.len(), 3);
        for (source, chunking) in sources.iter().zip(entry.chunk_variants()) {
            assert_eq!(source.chunking(), &chunking);
            assert_eq!(source.config().args, entry.args);
            assert_eq!(source.type_name(), "Random");
        }
    }

    #[test]
    fn should_default_to_single_auto_variant() {
        let entry = SourceConfig::new("Random").with_arg("shape", vec![4]);
        let sources: Vec<_> = source_factory(&entry).unwrap().collect();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].as_ref().unwrap().chunking(), &Chunking::Auto);
    }

    #[test]
    fn should_fail_for_unknown_type() {
        let entry = SourceConfig::new("Zarr");
        assert!(matches!(
            source_factory(&entry),
            Err(BenchError::UnknownSourceType(t)) if t == "Zarr"
        ));
    }

    #[test]
    fn should_name_variants_identically() {
        let entry = random_entry();
        let names: Vec<String> = source_factory(&entry)
            .unwrap()
            .map(|s| s.unwrap().name().to_string())
            .collect();
        assert!(names.windows(2).all(|w| w[0] == w[1]));

        let again = source_factory(&random_entry()).unwrap().next().unwrap().unwrap();
        assert_eq!(again.name(), names[0]);
    }

    #[test]
    fn should_use_explicit_name() {
        let entry = random_entry().with_name("tiny");
        let source = source_factory(&entry).unwrap().next().unwrap().unwrap();
        assert_eq!(source.name(), "tiny");
    }

    #[test]
    fn should_respect_allow_list() {
        let entry = random_entry().with_only(&["TimeMean"]);
        let source = source_factory(&entry).unwrap().next().unwrap().unwrap();
        assert!(source.is_compatible_with("TimeMean"));
        assert!(!source.is_compatible_with("Climatology"));

        let open = source_factory(&random_entry()).unwrap().next().unwrap().unwrap();
        assert!(open.is_compatible_with("Climatology"));
    }

    #[test]
    fn should_report_bad_args_as_config_error() {
        let entry = SourceConfig::new("Random").with_arg("shape", "wide");
        let first = source_factory(&entry).unwrap().next().unwrap();
        assert!(matches!(first, Err(BenchError::Config(_))));
    }

    #[test]
    fn should_list_registered_types() {
        let types: Vec<_> = source_types().collect();
        assert_eq!(types, vec!["Random", "MFDataset"]);
    }
}
