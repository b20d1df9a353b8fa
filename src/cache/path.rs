use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;

pub const CACHE_DIR_ENV: &str = "JOBCACHE_DIR";

const CACHE_FILE_NAME: &str = "cache.json";

pub fn cache_root() -> Result<PathBuf> {
    if let Ok(custom) = env::var(CACHE_DIR_ENV) {
        return Ok(PathBuf::from(custom));
    }

    let base_dirs = BaseDirs::new().context("failed to determine user directories")?;
    Ok(base_dirs.home_dir().join(".jobcache"))
}

pub fn default_cache_file() -> Result<PathBuf> {
    Ok(cache_file_in(&cache_root()?))
}

pub fn cache_file_in(root: &Path) -> PathBuf {
    root.join(CACHE_FILE_NAME)
}
