use std::{error::Error, path::PathBuf, str::FromStr};

use crate::{AppResult, ErrType};

pub const STORAGE_DIR_VAR: &str = "COLDLINK_STORAGE_DIR";
pub const MAX_ORIG_SIZE_VAR: &str = "COLDLINK_MAX_ORIG_IMAGE_SIZE";
pub const TMP_DIR_VAR: &str = "COLDLINK_TMP_DIR";
pub const JPEG_QUALITY_VAR: &str = "COLDLINK_JPEG_QUALITY";
pub const FETCH_TIMEOUT_VAR: &str = "COLDLINK_FETCH_TIMEOUT_SECS";

const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Destination of every generated variant, must already exist
    pub storage_dir: PathBuf,

    /// 0 means unlimited
    pub max_orig_size_bytes: u64,

    /// Where downloads are staged
    pub tmp_dir: PathBuf,

    pub jpeg_quality: u8,

    /// 0 disables the client timeout
    pub fetch_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            max_orig_size_bytes: 0,
            tmp_dir: std::env::temp_dir(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }

    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source, [`Self::from_env`] uses the process env
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let storage_dir = lookup(STORAGE_DIR_VAR)
            .filter(|dir| !dir.trim().is_empty())
            .ok_or(ErrType::ConfigError.msg(format!("{STORAGE_DIR_VAR} is not set")))?;

        let mut config = Self::new(storage_dir);

        if let Some(max) = parse_var::<u64>(&lookup, MAX_ORIG_SIZE_VAR)? {
            config.max_orig_size_bytes = max;
        }
        if let Some(tmp_dir) = lookup(TMP_DIR_VAR).filter(|dir| !dir.trim().is_empty()) {
            config.tmp_dir = PathBuf::from(tmp_dir);
        }
        if let Some(quality) = parse_var::<u8>(&lookup, JPEG_QUALITY_VAR)? {
            config = config.with_jpeg_quality(quality);
        }
        if let Some(timeout) = parse_var::<u64>(&lookup, FETCH_TIMEOUT_VAR)? {
            config.fetch_timeout_secs = timeout;
        }

        Ok(config)
    }

    pub fn with_max_orig_size(mut self, bytes: u64) -> Self {
        self.max_orig_size_bytes = bytes;
        self
    }

    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn with_fetch_timeout(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = secs;
        self
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: Error + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| ErrType::ConfigError.err(err, format!("Invalid value for {key}: {value}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_only_storage_dir_is_set() {
        let config = PipelineConfig::from_lookup(lookup_from(&[(STORAGE_DIR_VAR, "/srv/images")])).unwrap();

        assert_eq!(config.storage_dir, PathBuf::from("/srv/images"));
        assert_eq!(config.max_orig_size_bytes, 0);
        assert_eq!(config.tmp_dir, std::env::temp_dir());
        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.fetch_timeout_secs, 30);
    }

    #[test]
    fn reads_every_variable() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            (STORAGE_DIR_VAR, "/srv/images"),
            (MAX_ORIG_SIZE_VAR, "1048576"),
            (TMP_DIR_VAR, "/var/tmp/cold"),
            (JPEG_QUALITY_VAR, "250"),
            (FETCH_TIMEOUT_VAR, "0"),
        ]))
        .unwrap();

        assert_eq!(config.max_orig_size_bytes, 1_048_576);
        assert_eq!(config.tmp_dir, PathBuf::from("/var/tmp/cold"));
        assert_eq!(config.jpeg_quality, 100);
        assert_eq!(config.fetch_timeout_secs, 0);
    }

    #[test]
    fn missing_storage_dir_is_config_error() {
        let err = PipelineConfig::from_lookup(lookup_from(&[(MAX_ORIG_SIZE_VAR, "10")])).unwrap_err();
        assert_eq!(err.kind(), &ErrType::ConfigError);
    }

    #[test]
    fn malformed_size_is_config_error() {
        let err = PipelineConfig::from_lookup(lookup_from(&[(STORAGE_DIR_VAR, "/srv"), (MAX_ORIG_SIZE_VAR, "ten")]))
            .unwrap_err();

        assert_eq!(err.kind(), &ErrType::ConfigError);
        assert!(err.message().contains(MAX_ORIG_SIZE_VAR));
    }
}
