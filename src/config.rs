use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CompilerError;

const ENV_NAME: &str = "GMLC_ENV";
const CONTEXT: &str = "GMLC_CONTEXT";
const OUTPUT_DIR: &str = "GMLC_OUTPUT_DIR";
const DEBUG: &str = "GMLC_DEBUG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub install_dir: PathBuf,
    /// Resolution context used when `--context` is not given.
    #[serde(default)]
    pub context_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub debug: bool,
    pub env_name: String,
}

impl Config {
    /// What a fresh config file holds. Overrides are never part of it.
    fn defaults<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_name = lookup(ENV_NAME).unwrap_or_else(|| String::from("default"));
        let install_dir = Self::home_dir(lookup).join(".gmlc").join(&env_name);

        Config {
            context_path: None,
            output_dir: install_dir.join("out"),
            install_dir,
            debug: false,
            env_name,
        }
    }

    /// Environment variables win over whatever the config file says.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(CONTEXT) {
            self.context_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup(OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup(DEBUG) {
            self.debug = matches!(flag.trim().to_lowercase().as_str(), "true" | "1" | "yes");
        }
    }

    pub fn load() -> Result<Self, CompilerError> {
        let mut config = Self::load_from(&Self::get_config_path())?;
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Reads the config at `path`, writing the defaults there first if it
    /// does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self, CompilerError> {
        Self::load_or_init(path, |key| env::var(key).ok())
    }

    fn load_or_init<F>(path: &Path, lookup: F) -> Result<Self, CompilerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if !path.exists() {
            let config = Self::defaults(&lookup);
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), CompilerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn get_config_path() -> PathBuf {
        let lookup = |key: &str| env::var(key).ok();
        let env_name = lookup(ENV_NAME).unwrap_or_else(|| String::from("default"));
        Self::home_dir(&lookup)
            .join(".gmlc")
            .join(env_name)
            .join("config.json")
    }

    fn home_dir<F>(lookup: &F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
        PathBuf::from(lookup(key).unwrap_or_else(|| String::from(".")))
    }
}
