//! errors raised while driving bh_tsne

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TsneError {
    /// filesystem access, missing executable, missing result file
    #[error("io error {context} : {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// result file content inconsistent with its header
    #[error("bad result file format : {0}")]
    Format(String),
    /// git clone or compilation of bh_tsne failed
    #[error("could not build bh_tsne : {0}")]
    Build(String),
    /// process output has no "error is <float>" message
    #[error("no parseable \"error is\" message in bh_tsne output")]
    NoParseableError,
    #[error("invalid parameter : {0}")]
    InvalidParameter(String),
    /// bh_tsne did not exit within the configured timeout, it has been killed
    #[error("bh_tsne did not finish within {0:?}")]
    Timeout(Duration),
    #[error("csv error : {0}")]
    Csv(#[from] csv::Error),
}

impl TsneError {
    /// wraps an io error with a description of what was attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TsneError::Io {
            context: context.into(),
            source,
        }
    }

    /// true if error comes from a missing file or executable
    pub fn is_not_found(&self) -> bool {
        matches!(self, TsneError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

pub type TsneResult<T> = std::result::Result<T, TsneError>;
