use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PMEM_BASE: u64 = 0x8000_0000;

fn default_pmem_base() -> u64 {
    DEFAULT_PMEM_BASE
}

fn default_pmem_size() -> String {
    "256 MiB".to_string()
}

fn default_io_space_size() -> String {
    "128 MiB".to_string()
}

fn default_output_dir() -> String {
    "checkpoints".to_string()
}

fn default_workload() -> String {
    "workload".to_string()
}

fn default_config_name() -> String {
    "default".to_string()
}

fn default_compression_level() -> u32 {
    6
}

/// Simulated physical memory.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    #[serde(default = "default_pmem_base")]
    pub base: u64,
    #[serde(default = "default_pmem_size")]
    pub size: String, // e.g. "256 MiB"
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            base: default_pmem_base(),
            size: default_pmem_size(),
        }
    }
}

/// Backing storage shared by all device regions.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct IoSpaceConfig {
    #[serde(default = "default_io_space_size")]
    pub size: String,
}

impl Default for IoSpaceConfig {
    fn default() -> Self {
        Self {
            size: default_io_space_size(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointMode {
    #[default]
    None,
    Simpoint,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    #[serde(default)]
    pub mode: CheckpointMode,
    /// SimPoint interval length in instructions.
    #[serde(default)]
    pub interval: u64,
    /// Directory holding one sub-directory per workload with `simpoints0` and `weights0`.
    #[serde(default)]
    pub simpoint_dir: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_workload")]
    pub workload: String,
    #[serde(default = "default_config_name")]
    pub config_name: String,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            mode: CheckpointMode::None,
            interval: 0,
            simpoint_dir: None,
            output_dir: default_output_dir(),
            workload: default_workload(),
            config_name: default_config_name(),
            compression_level: default_compression_level(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub io_space: IoSpaceConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl SimConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open simulator config at {:?}", path.as_ref()))?;
        let config: Self =
            serde_yaml::from_reader(f).context("Failed to parse Simulator Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Simulator Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn pmem_size(&self) -> Result<u64> {
        parse_size(&self.memory.size).context("Invalid 'memory.size'")
    }

    pub fn io_space_size(&self) -> Result<u64> {
        parse_size(&self.io_space.size).context("Invalid 'io_space.size'")
    }

    pub fn validate(&self) -> Result<()> {
        if self.pmem_size()? == 0 {
            anyhow::bail!("Memory 'size' must be greater than zero");
        }

        if self.memory.base.checked_add(self.pmem_size()?).is_none() {
            anyhow::bail!(
                "Memory range {:#x} + {} overflows the physical address space",
                self.memory.base,
                self.memory.size
            );
        }

        self.io_space_size()?;

        let cpt = &self.checkpoint;
        if cpt.compression_level > 9 {
            anyhow::bail!(
                "Checkpoint 'compression_level' must be in 0..=9, got {}",
                cpt.compression_level
            );
        }

        if cpt.mode == CheckpointMode::Simpoint {
            if cpt.interval == 0 {
                anyhow::bail!("Checkpoint 'interval' must be greater than zero in simpoint mode");
            }
            match &cpt.simpoint_dir {
                Some(dir) if !dir.trim().is_empty() => {}
                _ => anyhow::bail!("Checkpoint 'simpoint_dir' is required in simpoint mode"),
            }
        }

        if cpt.workload.trim().is_empty() {
            anyhow::bail!("Checkpoint 'workload' cannot be empty");
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimConfig::from_yaml("{}").unwrap();
        assert_eq!(config.memory.base, DEFAULT_PMEM_BASE);
        assert_eq!(config.pmem_size().unwrap(), 256 * 1024 * 1024);
        assert_eq!(config.io_space_size().unwrap(), 128 * 1024 * 1024);
        assert_eq!(config.checkpoint.mode, CheckpointMode::None);
        assert_eq!(config.checkpoint.compression_level, 6);
    }

    #[test]
    fn test_valid_simpoint_config() {
        let yaml = r#"
memory:
  size: "64 KiB"
io_space:
  size: "1 MiB"
checkpoint:
  mode: simpoint
  interval: 1000
  simpoint_dir: "/data/simpoints"
  workload: "bzip2"
"#;
        let config = SimConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.pmem_size().unwrap(), 64 * 1024);
        assert_eq!(config.io_space_size().unwrap(), 1024 * 1024);
        assert_eq!(config.checkpoint.mode, CheckpointMode::Simpoint);
        assert_eq!(config.checkpoint.interval, 1000);
        assert_eq!(config.checkpoint.workload, "bzip2");
    }

    #[test]
    fn test_simpoint_mode_needs_interval() {
        let yaml = r#"
checkpoint:
  mode: simpoint
  simpoint_dir: "/data/simpoints"
"#;
        let err = SimConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("interval"));
    }

    #[test]
    fn test_simpoint_mode_needs_dir() {
        let yaml = r#"
checkpoint:
  mode: simpoint
  interval: 100
"#;
        let err = SimConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("simpoint_dir"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
memory:
  size: "64 KiB"
  sise: "oops"
"#;
        assert!(SimConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_bad_compression_level() {
        let yaml = r#"
checkpoint:
  compression_level: 12
"#;
        let err = SimConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("compression_level"));
    }

    #[test]
    fn test_zero_memory_rejected() {
        let yaml = r#"
memory:
  size: "0 B"
"#;
        let err = SimConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }
}
