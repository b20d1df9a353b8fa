use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const FILE_ENV: &str = "JOBCACHE_FILE";
pub const FAST_MODE_ENV: &str = "JOBCACHE_FAST_MODE";
pub const SUBMISSION_LIMIT_ENV: &str = "JOBCACHE_SUBMISSION_LIMIT";

/// Default number of programs one backend submission may hold.
pub const DEFAULT_SUBMISSION_LIMIT: usize = 300;

/// How cached templates are handed to the caller after patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatchMode {
    /// Patch a private deep copy; the template is never mutated.
    #[default]
    Safe,
    /// Patch the template itself and lend it out. The caller must be done with
    /// the returned job before touching the same chunk again; until then the
    /// template holds that caller's parameters.
    Fast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Programs per compiled job; one chunk never holds more slots than this.
    pub submission_size_limit: usize,
    pub fast_mode: bool,
    /// Where the cache is loaded from before first use and saved after every
    /// insert. `None` keeps the cache in memory only.
    pub persistence_target: Option<PathBuf>,
    /// Allow chunk 0 and slot 0 to stand in for chunks and slots that were
    /// never compiled.
    pub reuse_across_chunks: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            submission_size_limit: DEFAULT_SUBMISSION_LIMIT,
            fast_mode: false,
            persistence_target: None,
            reuse_across_chunks: true,
        }
    }
}

impl CacheConfig {
    pub fn mode(&self) -> PatchMode {
        if self.fast_mode {
            PatchMode::Fast
        } else {
            PatchMode::Safe
        }
    }

    pub fn with_persistence(mut self, path: impl Into<PathBuf>) -> Self {
        self.persistence_target = Some(path.into());
        self
    }

    pub fn with_mode(mut self, mode: PatchMode) -> Self {
        self.fast_mode = mode == PatchMode::Fast;
        self
    }

    pub fn with_submission_limit(mut self, limit: usize) -> Self {
        self.submission_size_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.submission_size_limit == 0 {
            bail!("submission_size_limit must be at least 1");
        }
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("failed to parse cache config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("failed to read cache config {}", path.display()))?;
        Self::from_yaml_str(&yaml).with_context(|| format!("in {}", path.display()))
    }

    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("failed to parse cache config")?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `JOBCACHE_FILE`, `JOBCACHE_FAST_MODE` and
    /// `JOBCACHE_SUBMISSION_LIMIT` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| env::var(name).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(path) = lookup(FILE_ENV).filter(|p| !p.is_empty()) {
            self.persistence_target = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup(FAST_MODE_ENV) {
            self.fast_mode = parse_flag(&flag)
                .with_context(|| format!("invalid {FAST_MODE_ENV} value `{flag}`"))?;
        }
        if let Some(limit) = lookup(SUBMISSION_LIMIT_ENV) {
            self.submission_size_limit = limit
                .trim()
                .parse()
                .with_context(|| format!("invalid {SUBMISSION_LIMIT_ENV} value `{limit}`"))?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, found `{other}`"),
    }
}
