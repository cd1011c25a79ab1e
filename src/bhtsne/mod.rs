//! Barnes-Hut t-SNE through the bh_tsne executable.
//!
//! - codec : binary data.dat / result.dat formats
//! - tool : location, build and invocation of the executable
//! - runner : working directories, single run and best of several trials
//! - errparse : extraction of the KL error bh_tsne prints
//! - csvio : csv import of data and export of embeddings
//!
//! The functions of this module are shortcuts building a [TsneRunner] on [BhTsne] for each call.
//!
//! ```no_run
//! use ndarray::array;
//! use tsnedriver::bhtsne::{run_best, RunParameters, TsneConfig};
//!
//! let data = array![[0., 0., 1.], [1., 1., 0.], [2., 2., 2.]];
//! let params = RunParameters::default().with_perplexity(1.);
//! let best = run_best(&data.view(), &params, 10, &TsneConfig::from_env()).unwrap();
//! ```

pub mod codec;
pub mod csvio;
pub mod error;
pub mod errparse;
pub mod params;
pub mod runner;
pub mod tool;

use std::path::PathBuf;

use ndarray::{Array2, ArrayView2};
use num_traits::float::Float;

pub use codec::{decode_result, encode_input};
pub use error::{TsneError, TsneResult};
pub use params::{RunParameters, TsneConfig};
pub use runner::{RunResult, TsneRunner};
pub use tool::{BhTsne, ExternalTool, ToolOutput};

/// locate bh_tsne, cloning and compiling it in config.tool_dir if needed
pub fn ensure_executable(config: &TsneConfig) -> TsneResult<PathBuf> {
    BhTsne::new(config.clone()).ensure()
}

/// one run of bh_tsne. See [TsneRunner::run_once]
pub fn run_once<T: Float>(
    matrix: &ArrayView2<T>,
    params: &RunParameters,
    config: &TsneConfig,
) -> TsneResult<Array2<f64>> {
    TsneRunner::new(BhTsne::new(config.clone())).run_once(matrix, params)
}

/// best of nb_trials runs of bh_tsne. See [TsneRunner::run_best]
pub fn run_best<T: Float>(
    matrix: &ArrayView2<T>,
    params: &RunParameters,
    nb_trials: usize,
    config: &TsneConfig,
) -> TsneResult<Option<RunResult>> {
    TsneRunner::new(BhTsne::new(config.clone())).run_best(matrix, params, nb_trials)
}
