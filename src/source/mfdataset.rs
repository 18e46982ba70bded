//! Source backed by array files on disk, joined along one dimension.

use serde::Deserialize;

use super::{Source, SourceCore};
use crate::array::{open_mfdataset, LazyArray};
use crate::error::Result;
use crate::glob::expand_paths;

fn default_concat_dim() -> String {
    "time".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MfDatasetArgs {
    path: String,
    var: String,
    #[serde(default = "default_concat_dim")]
    concat_dim: String,
}

/// One variable read from a set of array files joined along a dimension.
///
/// `path` may use `*` and `?` in its file name. Files are joined in sorted
/// order. The glob is re-expanded on every load.
#[derive(Debug)]
pub struct MfDataset {
    core: SourceCore,
    path: String,
    var: String,
    concat_dim: String,
}

impl MfDataset {
    pub const TYPE_NAME: &'static str = "MFDataset";

    pub(crate) fn from_core(core: SourceCore) -> Result<Box<dyn Source>> {
        let args: MfDatasetArgs = core.args()?;
        Ok(Box::new(Self {
            core,
            path: args.path,
            var: args.var,
            concat_dim: args.concat_dim,
        }))
    }
}

impl Source for MfDataset {
    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn load(&self) -> Result<LazyArray> {
        let paths = expand_paths(&self.path)?;
        Ok(open_mfdataset(
            &paths,
            &self.var,
            &self.concat_dim,
            self.chunking(),
        )?)
    }
}
