//! Runs bh_tsne once, or several times keeping the embedding with lowest error.
//!
//! Each run gets its own working directory as bh_tsne reads and writes files with fixed names
//! in its current directory. The directory is removed when the run ends, whatever the outcome.

use std::path::Path;
use std::time::SystemTime;

use cpu_time::ProcessTime;
use ndarray::{Array2, ArrayView2};
use num_traits::float::Float;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use super::codec::{decode_result, encode_input};
use super::errparse::parse_error;
use super::error::{TsneError, TsneResult};
use super::params::{RunParameters, TsneConfig};
use super::tool::{BhTsne, ExternalTool};

/// a candidate embedding and the KL error bh_tsne reported for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub error: f64,
    pub embedding: Array2<f64>,
}

/// Isolated directory holding one data.dat / result.dat pair. Removed with its content on drop.
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    /// allocates a fresh directory under root, or under the system temporary directory
    pub fn new(root: Option<&Path>) -> TsneResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bhtsne-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| TsneError::io("creating working directory", e))?;
        log::debug!("allocated working directory {}", dir.path().display());
        Ok(WorkDir { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
} // end of impl WorkDir

//========================================

/// Drives an [ExternalTool] with the file contract of bh_tsne.
pub struct TsneRunner<Tool: ExternalTool> {
    tool: Tool,
    config: TsneConfig,
}

impl TsneRunner<BhTsne> {
    /// runner on bh_tsne, configuration taken from environment. See [TsneConfig::from_env]
    pub fn from_env() -> Self {
        let config = TsneConfig::from_env();
        TsneRunner::with_config(BhTsne::new(config.clone()), config)
    }
}

impl<Tool: ExternalTool> TsneRunner<Tool> {
    /// runner with default file names and work root.
    pub fn new(tool: Tool) -> Self
    where
        Tool: HasConfig,
    {
        let config = tool.config().clone();
        Self::with_config(tool, config)
    }

    /// runner where config gives file names and the root of working directories
    pub fn with_config(tool: Tool, config: TsneConfig) -> Self {
        crate::ensure_log();
        TsneRunner { tool, config }
    }

    pub fn get_config(&self) -> &TsneConfig {
        &self.config
    }

    pub fn get_tool(&self) -> &Tool {
        &self.tool
    }

    /// locate (or build) the executable
    pub fn ensure_executable(&self) -> TsneResult<std::path::PathBuf> {
        self.tool.ensure()
    }

    fn workdir(&self) -> TsneResult<WorkDir> {
        WorkDir::new(self.config.work_root.as_deref())
    }

    /// Embeds matrix with one run of the tool.
    /// A non zero exit status is only logged, the result file is decoded anyway.
    pub fn run_once<T: Float>(&self, matrix: &ArrayView2<T>, params: &RunParameters) -> TsneResult<Array2<f64>> {
        let cpu_start = ProcessTime::now();
        let sys_now = SystemTime::now();
        //
        let workdir = self.workdir()?;
        encode_input(matrix, params, workdir.path(), &self.config)?;
        let output = self.tool.invoke(workdir.path())?;
        if let Some(error) = parse_error(&output.combined()) {
            log::info!("error is {}", error);
        }
        let embedding = decode_result(workdir.path(), &self.config)?;
        //
        log::info!(
            "run_once embedded ({},{}) in dim {}, sys time(ms) {:?} cpu time(ms) {:?}",
            matrix.nrows(),
            matrix.ncols(),
            embedding.ncols(),
            sys_now.elapsed().map(|d| d.as_millis()).unwrap_or(0),
            cpu_start.elapsed().as_millis()
        );
        Ok(embedding)
    } // end of run_once

    /// Runs the tool nb_trials times on the same input and returns the embedding with the lowest reported error.
    ///
    /// A trial whose output has no parseable error is skipped. The embedding of a trial is read just after it
    /// when its error improves on the best one, as the next trial overwrites the result file.
    /// Returns Ok(None) if no trial gave a parseable error.
    pub fn run_best<T: Float>(
        &self,
        matrix: &ArrayView2<T>,
        params: &RunParameters,
        nb_trials: usize,
    ) -> TsneResult<Option<RunResult>> {
        let cpu_start = ProcessTime::now();
        let sys_now = SystemTime::now();
        //
        let workdir = self.workdir()?;
        encode_input(matrix, params, workdir.path(), &self.config)?;
        let mut best: Option<RunResult> = None;
        for trial in 0..nb_trials {
            let output = self.tool.invoke(workdir.path())?;
            let error = match parse_error(&output.combined()) {
                Some(error) => error,
                None => {
                    log::warn!("trial {} : {}, skipping", trial, TsneError::NoParseableError);
                    continue;
                }
            };
            log::info!("trial {} error is {}", trial, error);
            let improves = best.as_ref().is_none_or(|b| error < b.error);
            if improves {
                let embedding = decode_result(workdir.path(), &self.config)?;
                best = Some(RunResult { error, embedding });
            }
        }
        //
        match best.as_ref() {
            Some(b) => log::info!(
                "run_best lowest error {} over {} trials, sys time(ms) {:?} cpu time(ms) {:?}",
                b.error,
                nb_trials,
                sys_now.elapsed().map(|d| d.as_millis()).unwrap_or(0),
                cpu_start.elapsed().as_millis()
            ),
            None => log::error!("run_best : none of {} trials reported an error", nb_trials),
        }
        Ok(best)
    } // end of run_best
} // end of impl TsneRunner

/// tools carrying their own [TsneConfig]
pub trait HasConfig {
    fn config(&self) -> &TsneConfig;
}

impl HasConfig for BhTsne {
    fn config(&self) -> &TsneConfig {
        self.get_config()
    }
}

//========================================

#[cfg(test)]
mod tests {

    use super::*;

    use std::cell::{Cell, RefCell};
    use std::path::PathBuf;

    use ndarray::array;
    use rand::prelude::*;
    use rand::distr::Uniform;
    use rand_xoshiro::Xoshiro256PlusPlus;

    use crate::bhtsne::codec::INPUT_HEADER_SIZE;
    use crate::bhtsne::tool::ToolOutput;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // Stub tool : copies input data in a result file with same shape, and reports
    // the errors it was given, one per invocation.
    struct PassThrough {
        config: TsneConfig,
        errors: Vec<Option<f64>>,
        calls: Cell<usize>,
        // directories we were invoked in
        seen: RefCell<Vec<PathBuf>>,
        // write garbage instead of a result file
        corrupt: bool,
    }

    impl PassThrough {
        fn new(config: TsneConfig, errors: Vec<Option<f64>>) -> Self {
            PassThrough {
                config,
                errors,
                calls: Cell::new(0),
                seen: RefCell::new(Vec::new()),
                corrupt: false,
            }
        }
    }

    impl HasConfig for PassThrough {
        fn config(&self) -> &TsneConfig {
            &self.config
        }
    }

    impl ExternalTool for PassThrough {
        fn resolve(&self) -> TsneResult<PathBuf> {
            Ok(PathBuf::from("pass_through"))
        }

        fn build(&self) -> TsneResult<PathBuf> {
            Err(TsneError::Build(String::from("stub")))
        }

        fn invoke(&self, workdir: &Path) -> TsneResult<ToolOutput> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            self.seen.borrow_mut().push(workdir.to_path_buf());
            let input = std::fs::read(workdir.join(&self.config.data_file)).unwrap();
            let n = i32::from_le_bytes(input[0..4].try_into().unwrap());
            let d = i32::from_le_bytes(input[4..8].try_into().unwrap());
            let mut result = Vec::<u8>::new();
            if self.corrupt {
                result.extend_from_slice(&n.to_le_bytes());
                result.extend_from_slice(&d.to_le_bytes());
                result.extend_from_slice(&[0u8; 5]);
            } else {
                let data_len = (n * d * 8) as usize;
                result.extend_from_slice(&n.to_le_bytes());
                result.extend_from_slice(&d.to_le_bytes());
                // scale values by the trial rank so each trial has its own embedding
                for c in input[INPUT_HEADER_SIZE..INPUT_HEADER_SIZE + data_len].chunks_exact(8) {
                    let x = f64::from_le_bytes(c.try_into().unwrap());
                    result.extend_from_slice(&(x * (call + 1) as f64).to_le_bytes());
                }
            }
            std::fs::write(workdir.join(&self.config.result_file), result).unwrap();
            let stdout = match self.errors.get(call).copied().flatten() {
                Some(e) => format!("Iteration 1000: error is {:.6} (50 iterations in 0.01 seconds)\n", e),
                None => String::from("Learning embedding...\n"),
            };
            Ok(ToolOutput {
                status: Some(0),
                stdout,
                stderr: String::new(),
            })
        }
    } // end of impl ExternalTool for PassThrough

    fn random_matrix(n: usize, d: usize, seed: u64) -> Array2<f64> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let unif = Uniform::<f64>::new(-10., 10.).unwrap();
        Array2::<f64>::from_shape_fn((n, d), |_| unif.sample(&mut rng))
    }

    fn stub_runner(work_root: &Path, errors: Vec<Option<f64>>) -> TsneRunner<PassThrough> {
        let config = TsneConfig::default().with_work_root(work_root);
        TsneRunner::new(PassThrough::new(config, errors))
    }

    fn is_empty_dir(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().count() == 0
    }

    #[test]
    fn run_once_round_trip() {
        log_init_test();
        let root = tempfile::tempdir().unwrap();
        let runner = stub_runner(root.path(), vec![Some(1.)]);
        for (n, d) in [(1, 1), (3, 2), (50, 7)] {
            let data = random_matrix(n, d, 1234567 + n as u64);
            let params = RunParameters::default().with_map_dims(d).with_seed(5);
            let embedding = runner.run_once(&data.view(), &params).unwrap();
            assert_eq!(embedding.dim(), (n, d));
            // first call of stub is identity, later ones scale
            let scale = runner.get_tool().calls.get() as f64;
            for (x, y) in data.iter().zip(embedding.iter()) {
                assert_eq!(x * scale, *y);
            }
        }
        assert!(is_empty_dir(root.path()));
    }

    #[test]
    fn run_once_bit_exact() {
        log_init_test();
        let root = tempfile::tempdir().unwrap();
        let runner = stub_runner(root.path(), vec![None]);
        let data = array![[0., 0.], [1., 1.], [2., 2.], [f64::MIN_POSITIVE, -0.0]];
        let embedding = runner.run_once(&data.view(), &RunParameters::default()).unwrap();
        for (x, y) in data.iter().zip(embedding.iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn run_once_uses_fresh_directories() {
        log_init_test();
        let root = tempfile::tempdir().unwrap();
        let runner = stub_runner(root.path(), vec![]);
        let data = array![[1., 2.]];
        runner.run_once(&data.view(), &RunParameters::default()).unwrap();
        runner.run_once(&data.view(), &RunParameters::default()).unwrap();
        let seen = runner.get_tool().seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
        assert!(seen.iter().all(|d| d.starts_with(root.path()) && !d.exists()));
    }

    #[test]
    fn best_selects_lowest_error() {
        log_init_test();
        let root = tempfile::tempdir().unwrap();
        let runner = stub_runner(root.path(), vec![Some(12.3), Some(4.5), Some(9.9)]);
        let data = random_matrix(10, 2, 987654);
        let best = runner
            .run_best(&data.view(), &RunParameters::default(), 3)
            .unwrap()
            .unwrap();
        assert_eq!(best.error, 4.5);
        // embedding of the second trial
        assert_eq!(best.embedding, data.mapv(|x| x * 2.));
        assert_eq!(runner.get_tool().calls.get(), 3);
        // all trials in the same directory, removed at the end
        let seen = runner.get_tool().seen.borrow();
        assert!(seen.iter().all(|d| *d == seen[0]));
        assert!(is_empty_dir(root.path()));
    }

    #[test]
    fn best_with_one_trial_is_run_once() {
        log_init_test();
        let data = random_matrix(20, 3, 4567);
        let params = RunParameters::default().with_map_dims(3);
        //
        let root = tempfile::tempdir().unwrap();
        let once = stub_runner(root.path(), vec![Some(0.7)])
            .run_once(&data.view(), &params)
            .unwrap();
        let best = stub_runner(root.path(), vec![Some(0.7)])
            .run_best(&data.view(), &params, 1)
            .unwrap()
            .unwrap();
        assert_eq!(once, best.embedding);
    }

    #[test]
    fn best_skips_unparseable_trials() {
        log_init_test();
        let root = tempfile::tempdir().unwrap();
        let data = random_matrix(5, 2, 11);
        //
        let runner = stub_runner(root.path(), vec![None, Some(3.25), None]);
        let best = runner
            .run_best(&data.view(), &RunParameters::default(), 3)
            .unwrap()
            .unwrap();
        assert_eq!(best.error, 3.25);
        assert_eq!(best.embedding, data.mapv(|x| x * 2.));
        //
        let runner = stub_runner(root.path(), vec![None, None]);
        let best = runner.run_best(&data.view(), &RunParameters::default(), 2).unwrap();
        assert!(best.is_none());
        //
        let best = runner.run_best(&data.view(), &RunParameters::default(), 0).unwrap();
        assert!(best.is_none());
        assert!(is_empty_dir(root.path()));
    }

    #[test]
    fn workdir_removed_on_format_error() {
        log_init_test();
        let root = tempfile::tempdir().unwrap();
        let config = TsneConfig::default().with_work_root(root.path());
        let mut tool = PassThrough::new(config, vec![Some(1.); 3]);
        tool.corrupt = true;
        let runner = TsneRunner::new(tool);
        let data = array![[1., 2.], [3., 4.]];
        let res = runner.run_once(&data.view(), &RunParameters::default());
        assert!(matches!(res, Err(TsneError::Format(_))));
        let res = runner.run_best(&data.view(), &RunParameters::default(), 2);
        assert!(matches!(res, Err(TsneError::Format(_))));
        assert!(is_empty_dir(root.path()));
    }

    #[test]
    fn workdir_removed_on_invalid_input() {
        log_init_test();
        let root = tempfile::tempdir().unwrap();
        let runner = stub_runner(root.path(), vec![]);
        let data = array![[1., 2.]];
        let res = runner.run_once(&data.view(), &RunParameters::default().with_perplexity(-1.));
        assert!(matches!(res, Err(TsneError::InvalidParameter(_))));
        assert_eq!(runner.get_tool().calls.get(), 0);
        assert!(is_empty_dir(root.path()));
    }
} // end of mod tests
