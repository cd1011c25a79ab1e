//! The external bh_tsne executable : location, build and invocation.
//!
//! The trait [ExternalTool] isolates the process from the codec and the runner so that
//! tests (or another t-SNE implementation with the same file contract) can substitute it.

use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::error::{TsneError, TsneResult};
use super::params::TsneConfig;

// polling period of a child run with a timeout
const POLL_PERIOD: Duration = Duration::from_millis(10);

/// What the process left on its standard streams
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// exit code, None if killed by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        text.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&self.stderr);
        text
    }
}

/// An executable reading its input and writing its result by fixed names in its working directory.
pub trait ExternalTool {
    /// locate an existing executable
    fn resolve(&self) -> TsneResult<PathBuf>;

    /// fetch and compile the executable, returning its path
    fn build(&self) -> TsneResult<PathBuf>;

    /// run the executable with workdir as current directory, without arguments, and wait for its exit
    fn invoke(&self, workdir: &Path) -> TsneResult<ToolOutput>;

    /// false when a missing executable must not be replaced by a build
    fn buildable(&self) -> bool {
        true
    }

    /// resolve, building if nothing is found and the tool is buildable
    fn ensure(&self) -> TsneResult<PathBuf> {
        if !self.buildable() {
            return self.resolve();
        }
        match self.resolve() {
            Ok(path) => Ok(path),
            Err(e) if e.is_not_found() => {
                log::info!("executable not found ({}), building it", e);
                self.build()
            }
            Err(e) => Err(e),
        }
    }
}

//========================================

// search binary in a PATH-like list of directories
fn find_in_dirs(binary: &str, dirs: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(dirs)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

// the child runs in its working directory, a relative program path would be resolved from there
fn absolute(path: &Path) -> TsneResult<PathBuf> {
    std::path::absolute(path).map_err(|e| TsneError::io(format!("making {} absolute", path.display()), e))
}

/// bh_tsne of L. van der Maaten, driven by a [TsneConfig]
pub struct BhTsne {
    config: TsneConfig,
    // executable once resolved
    exe: OnceLock<PathBuf>,
}

impl BhTsne {
    pub fn new(config: TsneConfig) -> Self {
        BhTsne {
            config,
            exe: OnceLock::new(),
        }
    }

    pub fn get_config(&self) -> &TsneConfig {
        &self.config
    }

    // resolved executable, resolution (and possibly build) done at first call
    fn executable(&self) -> TsneResult<&Path> {
        if let Some(exe) = self.exe.get() {
            return Ok(exe.as_path());
        }
        let exe = self.ensure()?;
        Ok(self.exe.get_or_init(|| exe).as_path())
    }

    // resolution with search_path standing for PATH. Returned path is absolute.
    fn resolve_in(&self, search_path: Option<&OsStr>) -> TsneResult<PathBuf> {
        let config = &self.config;
        if let Some(exe) = config.exe_path.as_ref() {
            if exe.is_file() {
                log::debug!("using configured executable {}", exe.display());
                return absolute(exe);
            }
            return Err(TsneError::io(
                format!("configured executable {}", exe.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        let mut candidates = Vec::<PathBuf>::with_capacity(3);
        if let Some(exe) = search_path.and_then(|dirs| find_in_dirs(&config.exe_name, dirs)) {
            candidates.push(exe);
        }
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(&config.exe_name));
        }
        candidates.push(config.built_exe());
        match candidates.into_iter().find(|c| c.is_file()) {
            Some(exe) => {
                let exe = absolute(&exe)?;
                log::info!("found {}", exe.display());
                Ok(exe)
            }
            None => Err(TsneError::io(
                format!(
                    "searching {} in PATH, current directory and {}",
                    config.exe_name,
                    config.tool_dir.display()
                ),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )),
        }
    } // end of resolve_in

    fn run_step(&self, command: &mut Command, what: &str) -> TsneResult<()> {
        log::info!("build step : {:?}", command);
        let status = command
            .status()
            .map_err(|e| TsneError::Build(format!("{} could not be launched : {}", what, e)))?;
        if !status.success() {
            log::error!("{} failed with {}", what, status);
            return Err(TsneError::Build(format!("{} failed with {}", what, status)));
        }
        Ok(())
    }
} // end of impl BhTsne

impl ExternalTool for BhTsne {
    fn resolve(&self) -> TsneResult<PathBuf> {
        self.resolve_in(std::env::var_os("PATH").as_deref())
    }

    fn build(&self) -> TsneResult<PathBuf> {
        let config = &self.config;
        log::info!(
            "{} not found; cloning from {} in {}",
            config.exe_name,
            config.source_url,
            config.tool_dir.display()
        );
        self.run_step(
            Command::new("git")
                .arg("clone")
                .arg(&config.source_url)
                .arg(&config.tool_dir),
            "git clone",
        )?;
        self.run_step(
            Command::new(&config.compiler)
                .args(["sptree.cpp", "tsne.cpp", "-o"])
                .arg(&config.exe_name)
                .arg("-O2")
                .current_dir(&config.tool_dir),
            "compilation",
        )?;
        let exe = config.built_exe();
        if !exe.is_file() {
            return Err(TsneError::Build(format!("{} not produced by compilation", exe.display())));
        }
        log::info!("built {}", exe.display());
        Ok(exe)
    } // end of build

    // an explicitly configured executable is never replaced by a build
    fn buildable(&self) -> bool {
        self.config.exe_path.is_none()
    }

    fn invoke(&self, workdir: &Path) -> TsneResult<ToolOutput> {
        let exe = self.executable()?;
        log::debug!("running {} in {}", exe.display(), workdir.display());
        let child = Command::new(exe)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TsneError::io(format!("launching {}", exe.display()), e))?;
        //
        let output = match self.config.timeout {
            None => {
                let output = child
                    .wait_with_output()
                    .map_err(|e| TsneError::io("waiting for bh_tsne", e))?;
                ToolOutput {
                    status: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }
            }
            Some(timeout) => wait_with_timeout(child, timeout)?,
        };
        if !output.success() {
            log::warn!("{} exited with status {:?}", exe.display(), output.status);
        }
        Ok(output)
    } // end of invoke
} // end of impl ExternalTool for BhTsne

//========================================

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    stream.map(|mut s| {
        std::thread::spawn(move || {
            let mut buf = Vec::<u8>::new();
            let _ = s.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

// pipes are drained by threads while we poll, so a verbose child cannot block on a full pipe
fn wait_with_timeout(mut child: Child, timeout: Duration) -> TsneResult<ToolOutput> {
    let out_handle = drain(child.stdout.take());
    let err_handle = drain(child.stderr.take());
    let start = Instant::now();
    let status: ExitStatus = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    log::error!("bh_tsne still running after {:?}, killing it", timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    // reader threads end with the killed process pipes
                    let _ = collect(out_handle);
                    let _ = collect(err_handle);
                    return Err(TsneError::Timeout(timeout));
                }
                std::thread::sleep(POLL_PERIOD);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = collect(out_handle);
                let _ = collect(err_handle);
                return Err(TsneError::io("polling bh_tsne", e));
            }
        }
    };
    Ok(ToolOutput {
        status: status.code(),
        stdout: collect(out_handle),
        stderr: collect(err_handle),
    })
} // end of wait_with_timeout

//========================================

// end of mod tests
