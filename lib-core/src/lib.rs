use std::{error::Error, fmt::Display};

pub mod config;
pub mod fetch;
pub mod media;
pub mod pipeline;
pub mod storage;
pub mod target;

pub use config::PipelineConfig;
pub use pipeline::{Coldlink, VariantMap};
pub use storage::tmp::{CleanupHandle, StagedImage};
pub use target::{Operation, RawTargetSpec, TargetSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrType {
    FetchError,
    FsError,
    TooLarge {
        size: u64,
    },
    MediaError,
    UnknownTarget,
    InvalidTarget,
    ConfigError,
}
impl ErrType {
    #[track_caller]
    pub fn msg(self, message: impl Into<String>) -> AppError {
        AppError::init(self, None, message)
    }

    #[track_caller]
    pub fn err(self, err: impl Into<Box<dyn Error>>, message: impl Into<String>) -> AppError {
        AppError::init(self, Some(err.into()), message)
    }
}
impl Display for ErrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ErrType::FetchError => "FetchError",
                ErrType::FsError => "FileSystemError",
                ErrType::TooLarge {
                    ..
                } => "TooLargeError",
                ErrType::MediaError => "MediaError",
                ErrType::UnknownTarget => "UnknownTargetError",
                ErrType::InvalidTarget => "InvalidTargetError",
                ErrType::ConfigError => "ConfigError",
            }
        )
    }
}

#[derive(Debug)]
pub struct AppError {
    _type: ErrType,
    message: String,
    at: String,
    err_msg: String,
}

impl AppError {
    #[track_caller]
    fn init(_type: ErrType, err: Option<Box<dyn Error>>, message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        let at = format!("{}:{}:{}", location.file(), location.line(), location.column());
        AppError {
            _type,
            message: message.into(),
            at,
            err_msg: err.map(|e| e.to_string()).unwrap_or("".into()),
        }
    }

    pub fn kind(&self) -> &ErrType {
        &self._type
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Source location where the error was raised
    pub fn at(&self) -> &str {
        &self.at
    }

    /// Folds a secondary cleanup failure into this error.
    ///
    /// The kind and location stay those of `self`, only the message grows.
    pub fn also(mut self, cleanup: AppError) -> Self {
        self.message = format!("{} (also failed to remove temp image: {})", self.message, cleanup);
        self
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.err_msg.is_empty() {
            write!(f, "[{}] {}", self._type, self.message)
        } else {
            write!(f, "[{}] {}: {}", self._type, self.message, self.err_msg)
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;
