//! Runner configuration.
//!
//! Supports loading configuration from:
//! 1. Configuration files (YAML)
//! 2. Environment variables (with JOBRUNNER_ prefix)
//! 3. .env files
//!
//! Environment variables take precedence over the file, which takes
//! precedence over defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::BackendType;
use crate::error::{RunnerError, RunnerResult};
use crate::normalize::OutputEncoding;

/// Static configuration captured when a [`JobRunner`](crate::JobRunner) is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Scheduler jobs are sent to.
    #[serde(default)]
    pub backend: BackendType,

    /// Remove the `.suffix` from returned job ids.
    #[serde(default = "default_true")]
    pub strip_array_suffix: bool,

    /// Options appended to every submission command.
    #[serde(default)]
    pub extra_params: Option<String>,

    /// Log command lines and job ids at `info` level.
    #[serde(default)]
    pub verbose: bool,

    /// Encoding of submission tool output. Files that omit it use the locale.
    #[serde(default = "OutputEncoding::from_env")]
    pub encoding: OutputEncoding,
}

fn default_true() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            strip_array_suffix: true,
            extra_params: None,
            verbose: false,
            encoding: OutputEncoding::default(),
        }
    }
}

impl RunnerConfig {
    /// Configuration for a backend given by name, case-insensitively.
    pub fn new(backend: &str) -> RunnerResult<Self> {
        Ok(Self {
            backend: backend.parse()?,
            ..Default::default()
        })
    }

    /// Configuration for a known backend.
    pub fn for_backend(backend: BackendType) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Keep or strip job id suffixes.
    pub fn with_strip_array_suffix(mut self, strip: bool) -> Self {
        self.strip_array_suffix = strip;
        self
    }

    /// Append `params` to every submission.
    pub fn with_extra_params(mut self, params: impl Into<String>) -> Self {
        self.extra_params = Some(params.into());
        self
    }

    /// Log command lines at `info`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Decode tool output with `encoding`.
    pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> RunnerResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: RunnerConfig = serde_yaml_ng::from_str(&contents).map_err(|e| {
            RunnerError::Configuration(format!("{}: {e}", path.as_ref().display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with the following precedence:
    /// 1. Load .env file if it exists
    /// 2. Load from file if provided, defaults otherwise
    /// 3. Apply environment variable overrides
    ///
    /// The encoding falls back to the process locale.
    pub fn load(config_file: Option<&Path>) -> RunnerResult<Self> {
        dotenvy::dotenv().ok();

        let config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default().with_encoding(OutputEncoding::from_env()),
        };

        let config = config.merge_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `JOBRUNNER_*` variables from the process environment.
    pub fn merge_env(self) -> RunnerResult<Self> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    /// Apply `JOBRUNNER_*` variables from an arbitrary lookup.
    ///
    /// Only variables that are set override the current values.
    pub fn merge_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> RunnerResult<Self> {
        if let Some(v) = lookup("JOBRUNNER_BACKEND") {
            self.backend = v.parse()?;
        }
        if let Some(v) = lookup("JOBRUNNER_STRIP_ARRAY_SUFFIX") {
            self.strip_array_suffix = parse_bool("JOBRUNNER_STRIP_ARRAY_SUFFIX", &v)?;
        }
        if let Some(v) = lookup("JOBRUNNER_EXTRA_PARAMS") {
            self.extra_params = Some(v).filter(|v| !v.is_empty());
        }
        if let Some(v) = lookup("JOBRUNNER_VERBOSE") {
            self.verbose = parse_bool("JOBRUNNER_VERBOSE", &v)?;
        }
        if let Some(v) = lookup("JOBRUNNER_ENCODING") {
            self.encoding = OutputEncoding::from_name(&v).ok_or_else(|| {
                RunnerError::Configuration(format!("Unknown encoding in JOBRUNNER_ENCODING: {v}"))
            })?;
        }
        Ok(self)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> RunnerResult<()> {
        if let Some(ref params) = self.extra_params {
            if params.contains('\n') {
                return Err(RunnerError::Configuration(
                    "extra_params must fit on one line".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> RunnerResult<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RunnerError::Configuration(format!(
            "Invalid boolean in {key}: {value}"
        ))),
    }
}
