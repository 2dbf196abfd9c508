use crate::{Error, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiftConfig {
    #[serde(default = "default_id")]
    pub id: String,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    Can(CanConfig),
    Uart(UartConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanConfig {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_node_id")]
    pub node_id: u8,
    /// Expected bus bitrate. SocketCAN interfaces are configured outside the process.
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    #[serde(default = "default_can_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UartConfig {
    pub device: String,
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default = "default_uart_timeout_ms")]
    pub timeout_ms: u64,
    /// Trapezoid speed programmed when the link is opened.
    #[serde(default = "default_initial_speed_rpm")]
    pub initial_speed_rpm: f64,
}

fn default_id() -> String {
    "lift".to_string()
}
fn default_channel() -> String {
    "can1".to_string()
}
fn default_node_id() -> u8 {
    1
}
fn default_bitrate() -> u32 {
    500_000
}
fn default_can_timeout_ms() -> u64 {
    100
}
fn default_baudrate() -> u32 {
    38_400
}
fn default_uart_timeout_ms() -> u64 {
    200
}
fn default_initial_speed_rpm() -> f64 {
    200.0
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            node_id: default_node_id(),
            bitrate: default_bitrate(),
            timeout_ms: default_can_timeout_ms(),
        }
    }
}

impl CanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=127).contains(&self.node_id) {
            return Err(Error::Config(format!(
                "node id must be in 1..=127, got {}",
                self.node_id
            )));
        }
        if self.channel.trim().is_empty() {
            return Err(Error::Config("CAN channel name is empty".into()));
        }
        if self.bitrate == 0 || self.timeout_ms == 0 {
            return Err(Error::Config("bitrate and timeout must be non-zero".into()));
        }
        Ok(())
    }
}

impl UartConfig {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baudrate: default_baudrate(),
            timeout_ms: default_uart_timeout_ms(),
            initial_speed_rpm: default_initial_speed_rpm(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.trim().is_empty() {
            return Err(Error::Config("serial device path is empty".into()));
        }
        if self.baudrate == 0 || self.timeout_ms == 0 {
            return Err(Error::Config("baud rate and timeout must be non-zero".into()));
        }
        if !self.initial_speed_rpm.is_finite() || self.initial_speed_rpm < 0.0 {
            return Err(Error::Config(format!(
                "initial speed must be a non-negative rpm, got {}",
                self.initial_speed_rpm
            )));
        }
        Ok(())
    }
}

impl LiftConfig {
    pub fn validate(&self) -> Result<()> {
        match &self.transport {
            TransportConfig::Can(c) => c.validate(),
            TransportConfig::Uart(u) => u.validate(),
        }
    }
}

/// Lift configurations keyed by id.
#[derive(Debug, Default, Clone)]
pub struct LiftRegistry {
    pub lifts: HashMap<String, LiftConfig>,
}

impl LiftRegistry {
    pub fn insert(&mut self, config: LiftConfig) {
        self.lifts.insert(config.id.clone(), config);
    }

    pub fn get(&self, id: &str) -> Option<&LiftConfig> {
        self.lifts.get(id)
    }
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<LiftConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading lift config: {}", path.display()))?;
    let config: LiftConfig =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating lift config: {}", path.display()))?;
    Ok(config)
}

pub fn load_configs_dir(dir: impl AsRef<Path>) -> anyhow::Result<LiftRegistry> {
    let mut reg = LiftRegistry::default();
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if ext == "yml" || ext == "yaml" {
                entries.push(path);
            }
        }
    }
    entries.sort();
    for p in entries {
        let config = load_config_file(&p)?;
        reg.insert(config);
    }
    Ok(reg)
}
