//! Synthetic source of uniform random data.

use rand::Rng;
use serde::Deserialize;

use super::{Source, SourceCore};
use crate::array::{shape_nbytes, Chunking, Coordinate, LazyArray};
use crate::config::SourceConfig;
use crate::error::{ConfigError, Result};

/// Dimension names, taken in order for as many axes as the shape has.
const DIMS: [&str; 4] = ["time", "lat", "lon", "level"];

const TIME_UNITS: &str = "days since 2001-01-01";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RandomArgs {
    shape: Vec<usize>,
    /// Fixed seed; a fresh one is drawn on every load when absent.
    #[serde(default)]
    seed: Option<u64>,
}

/// Random values over `time`, `lat`, `lon` and `level` axes.
///
/// The time axis is daily from 2001-01-01.
#[derive(Debug)]
pub struct Random {
    core: SourceCore,
    shape: Vec<usize>,
    seed: Option<u64>,
}

impl Random {
    pub const TYPE_NAME: &'static str = "Random";

    /// A standalone source of the given shape.
    pub fn new(shape: &[usize], chunking: Chunking) -> Result<Self> {
        let config = SourceConfig::new(Self::TYPE_NAME)
            .with_arg("shape", shape.to_vec())
            .with_chunks(vec![chunking.clone()]);
        Self::build(SourceCore::new(config, chunking)?)
    }

    pub(crate) fn from_core(core: SourceCore) -> Result<Box<dyn Source>> {
        Ok(Box::new(Self::build(core)?))
    }

    fn build(core: SourceCore) -> Result<Self> {
        let args: RandomArgs = core.args()?;
        if args.shape.is_empty() || args.shape.len() > DIMS.len() {
            return Err(ConfigError::Invalid(format!(
                "Random shape must have 1 to {} dimensions, got {}",
                DIMS.len(),
                args.shape.len()
            ))
            .into());
        }
        if shape_nbytes(&args.shape).is_none() {
            return Err(ConfigError::Invalid(format!(
                "Random shape {:?} is too large to address",
                args.shape
            ))
            .into());
        }
        Ok(Self {
            core,
            shape: args.shape,
            seed: args.seed,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }
}

impl Source for Random {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn load(&self) -> Result<LazyArray> {
        let dims: Vec<String> = DIMS[..self.shape.len()]
            .iter()
            .map(|d| d.to_string())
            .collect();
        let coords = dims
            .iter()
            .zip(&self.shape)
            .map(|(dim, &len)| {
                let units = match dim.as_str() {
                    "time" => Some(TIME_UNITS),
                    "lat" => Some("degrees_north"),
                    "lon" => Some("degrees_east"),
                    _ => Some("m"),
                };
                Coordinate::arange(dim.clone(), len, units)
            })
            .collect();
        let seed = self.seed.unwrap_or_else(|| rand::rng().random());

        Ok(LazyArray::random(
            "sample",
            dims,
            self.shape.clone(),
            coords,
            self.chunking(),
            seed,
        )?)
    }
}
