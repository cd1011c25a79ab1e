//! t-SNE run parameters and driver configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{TsneError, TsneResult};

/// default Barnes-Hut accuracy
pub const THETA: f64 = 0.5;
/// default perplexity
pub const PERPLEXITY: f64 = 30.;
/// default embedding dimension
pub const MAP_DIMS: usize = 2;
/// default number of gradient iterations
pub const MAX_ITER: usize = 1000;

/// repository bh_tsne is cloned from when no executable is found
pub const TSNE_SOURCE: &str = "https://github.com/lvdmaaten/bhtsne";

/// Parameters transmitted to bh_tsne through the data file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Barnes-Hut speed/accuracy trade-off. Must be in (0, 1]
    pub theta: f64,
    /// effective number of neighbours
    pub perplexity: f64,
    /// dimension of the embedding
    pub map_dims: usize,
    /// iteration budget
    pub max_iter: usize,
    /// random seed. Note that bh_tsne data file only gets a marker, see [encode_input](super::codec::encode_input)
    pub seed: Option<i32>,
}

impl Default for RunParameters {
    fn default() -> Self {
        RunParameters {
            theta: THETA,
            perplexity: PERPLEXITY,
            map_dims: MAP_DIMS,
            max_iter: MAX_ITER,
            seed: None,
        }
    }
}

impl RunParameters {
    pub fn new(theta: f64, perplexity: f64, map_dims: usize, max_iter: usize) -> Self {
        RunParameters {
            theta,
            perplexity,
            map_dims,
            max_iter,
            seed: None,
        }
    }

    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    pub fn with_perplexity(mut self, perplexity: f64) -> Self {
        self.perplexity = perplexity;
        self
    }

    pub fn with_map_dims(mut self, map_dims: usize) -> Self {
        self.map_dims = map_dims;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_seed(mut self, seed: i32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// checks parameters are in the range bh_tsne accepts and fit the i32 fields of the data file
    pub fn check(&self) -> TsneResult<()> {
        if !(self.theta > 0. && self.theta <= 1.) {
            return Err(TsneError::InvalidParameter(format!(
                "theta must be in (0,1], got {}",
                self.theta
            )));
        }
        if !(self.perplexity.is_finite() && self.perplexity > 0.) {
            return Err(TsneError::InvalidParameter(format!(
                "perplexity must be > 0, got {}",
                self.perplexity
            )));
        }
        if self.map_dims == 0 || i32::try_from(self.map_dims).is_err() {
            return Err(TsneError::InvalidParameter(format!(
                "map_dims must be in [1, i32::MAX], got {}",
                self.map_dims
            )));
        }
        if self.max_iter == 0 || i32::try_from(self.max_iter).is_err() {
            return Err(TsneError::InvalidParameter(format!(
                "max_iter must be in [1, i32::MAX], got {}",
                self.max_iter
            )));
        }
        Ok(())
    }
} // end of impl RunParameters

//========================================

/// Everything the driver needs to know about bh_tsne and where to run it.
///
/// bh_tsne has its file names hardcoded, they are kept here so that a patched executable can be used.
#[derive(Debug, Clone)]
pub struct TsneConfig {
    /// input file name, relative to the working directory
    pub data_file: String,
    /// output file name, relative to the working directory
    pub result_file: String,
    /// name of executable searched in PATH and current directory
    pub exe_name: String,
    /// if set, used as executable and no search is done
    pub exe_path: Option<PathBuf>,
    /// where bh_tsne is cloned and built if not found
    pub tool_dir: PathBuf,
    /// git url of bh_tsne sources
    pub source_url: String,
    /// c++ compiler used for the build
    pub compiler: String,
    /// directory under which working directories are created. System temporary directory if None
    pub work_root: Option<PathBuf>,
    /// kill bh_tsne after this delay. None: wait for ever
    pub timeout: Option<Duration>,
}

impl Default for TsneConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        TsneConfig {
            data_file: String::from("data.dat"),
            result_file: String::from("result.dat"),
            exe_name: String::from("bh_tsne"),
            exe_path: None,
            tool_dir: home.join(".bhtsne"),
            source_url: String::from(TSNE_SOURCE),
            compiler: String::from("g++"),
            work_root: None,
            timeout: None,
        }
    }
}

impl TsneConfig {
    /// default configuration amended by environment variables :
    /// - BHTSNE_EXE : path of executable to use
    /// - BHTSNE_TOOL_DIR : directory where bh_tsne is searched and built
    /// - BHTSNE_WORK_ROOT : directory where working directories are allocated
    pub fn from_env() -> Self {
        let mut config = TsneConfig::default();
        if let Some(exe) = std::env::var_os("BHTSNE_EXE") {
            config.exe_path = Some(PathBuf::from(exe));
        }
        if let Some(dir) = std::env::var_os("BHTSNE_TOOL_DIR") {
            config.tool_dir = PathBuf::from(dir);
        }
        if let Some(dir) = std::env::var_os("BHTSNE_WORK_ROOT") {
            config.work_root = Some(PathBuf::from(dir));
        }
        log::debug!("TsneConfig::from_env : {:?}", config);
        config
    }

    pub fn with_exe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.exe_path = Some(path.into());
        self
    }

    pub fn with_tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dir = dir.into();
        self
    }

    pub fn with_work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_root = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_file_names(mut self, data_file: &str, result_file: &str) -> Self {
        self.data_file = data_file.to_string();
        self.result_file = result_file.to_string();
        self
    }

    /// path of executable once built in tool_dir
    pub fn built_exe(&self) -> PathBuf {
        self.tool_dir.join(&self.exe_name)
    }
} // end of impl TsneConfig

//========================================

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn default_params_are_valid() {
        let params = RunParameters::default();
        assert_eq!(params.theta, 0.5);
        assert_eq!(params.perplexity, 30.);
        assert_eq!(params.map_dims, 2);
        assert_eq!(params.max_iter, 1000);
        assert!(params.seed.is_none());
        assert!(params.check().is_ok());
    }

    #[test]
    fn check_rejects_out_of_range() {
        let params = RunParameters::default();
        assert!(params.with_theta(0.).check().is_err());
        assert!(params.with_theta(1.5).check().is_err());
        assert!(params.with_theta(1.).check().is_ok());
        assert!(params.with_perplexity(0.).check().is_err());
        assert!(params.with_perplexity(f64::NAN).check().is_err());
        assert!(params.with_map_dims(0).check().is_err());
        assert!(params.with_max_iter(0).check().is_err());
        assert!(params.with_max_iter(i32::MAX as usize + 1).check().is_err());
    }

    #[test]
    fn config_defaults() {
        let config = TsneConfig::default().with_tool_dir("/opt/bhtsne");
        assert_eq!(config.data_file, "data.dat");
        assert_eq!(config.result_file, "result.dat");
        assert_eq!(config.built_exe(), PathBuf::from("/opt/bhtsne/bh_tsne"));
        assert!(config.timeout.is_none());
    }
} // end of mod tests
