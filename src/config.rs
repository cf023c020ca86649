//=====================================================
// File: config.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Configuration loading for SolvraRepair
// Objective: Read sandbox, controller and agent settings from TOML with
//            defaults for every field and an environment override
//=====================================================

use crate::agent::AgentConfig;
use crate::controller::ControllerConfig;
use crate::sandbox::SandboxConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name inside the user's configuration directory.
const CONFIG_FILE: &str = "repair.toml";
pub const TIMEOUT_ENV: &str = "SOLVRA_REPAIR_TIMEOUT_MS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub sandbox: SandboxConfig,
    pub controller: ControllerConfig,
    pub agent: AgentConfig,
}

impl RepairConfig {
    /// `<config dir>/solvra/repair.toml`, when a config dir exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("solvra").join(CONFIG_FILE))
    }

    /// Load `path`, or the default location when `None`. A missing default
    /// file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("parsing configuration {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let serialized = toml::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("writing configuration to {}", path.display()))?;
        Ok(())
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(raw) = env::var(TIMEOUT_ENV) {
            self.sandbox.timeout_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be milliseconds, got {:?}", TIMEOUT_ENV, raw))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repair.toml");
        fs::write(
            &path,
            "[sandbox]\nrecord_limit = 5\n\n[controller]\nmax_solution_debug_times = 1\n",
        )
        .expect("write");

        let config = RepairConfig::from_file(&path).expect("load");
        assert_eq!(config.sandbox.record_limit, 5);
        assert_eq!(config.sandbox.entry, "main");
        assert_eq!(config.controller.max_solution_debug_times, 1);
        assert_eq!(config.controller.max_program_debug_times, 2);
        assert_eq!(config.agent, AgentConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("repair.toml");
        let mut config = RepairConfig::default();
        config.agent.max_cycles = 7;
        config.save(&path).expect("save");
        assert_eq!(RepairConfig::from_file(&path).expect("load"), config);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = RepairConfig::from_file(&dir.path().join("absent.toml")).expect_err("missing");
        assert!(format!("{err:#}").contains("reading configuration"));
    }
}

//=====================================================
// End of file
//=====================================================
