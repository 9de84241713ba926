// SPDX-License-Identifier: CEPL-1.0
//! `tether.toml`, plus the environment override for validation.
use std::{fs, path::Path};

use serde::Deserialize;
use tether_vk::{diagnostics::Severity, vk, Criteria, Settings};
use tracing::warn;

pub const DEFAULT_PATH: &str = "tether.toml";
pub const VALIDATION_ENV: &str = "TETHER_VALIDATION";

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppCfg,
    #[serde(default)]
    pub vulkan: VulkanCfg,
    #[serde(default)]
    pub selection: SelectionCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppCfg {
    pub name: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for AppCfg {
    fn default() -> Self {
        AppCfg {
            name: "tether".to_owned(),
            title: "tether".to_owned(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VulkanCfg {
    pub validation: bool,
    pub validation_level: LevelCfg,
    /// "major.minor"
    pub api_version: String,
}

impl Default for VulkanCfg {
    fn default() -> Self {
        VulkanCfg {
            validation: cfg!(debug_assertions),
            validation_level: LevelCfg::default(),
            api_version: "1.0".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LevelCfg {
    Verbose,
    Info,
    #[default]
    Warning,
    Error,
}

impl From<LevelCfg> for Severity {
    fn from(level: LevelCfg) -> Self {
        match level {
            LevelCfg::Verbose => Severity::Verbose,
            LevelCfg::Info => Severity::Info,
            LevelCfg::Warning => Severity::Warning,
            LevelCfg::Error => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceTypeCfg {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

impl From<DeviceTypeCfg> for vk::PhysicalDeviceType {
    fn from(ty: DeviceTypeCfg) -> Self {
        match ty {
            DeviceTypeCfg::Discrete => vk::PhysicalDeviceType::DISCRETE_GPU,
            DeviceTypeCfg::Integrated => vk::PhysicalDeviceType::INTEGRATED_GPU,
            DeviceTypeCfg::Virtual => vk::PhysicalDeviceType::VIRTUAL_GPU,
            DeviceTypeCfg::Cpu => vk::PhysicalDeviceType::CPU,
            DeviceTypeCfg::Other => vk::PhysicalDeviceType::OTHER,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SelectionCfg {
    pub device_types: Vec<DeviceTypeCfg>,
}

impl Default for SelectionCfg {
    fn default() -> Self {
        SelectionCfg {
            device_types: vec![DeviceTypeCfg::Discrete, DeviceTypeCfg::Integrated],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default = "default_vsync")]
    pub vsync: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            vsync: default_vsync(),
        }
    }
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}
fn default_vsync() -> bool {
    true
}

impl Config {
    /// Reads `path`; a missing or broken file yields the defaults.
    pub fn load(path: &Path) -> Config {
        match fs::read_to_string(path) {
            Ok(s) => Config::parse(&s).unwrap_or_else(|err| {
                warn!("ignoring {}: {err}", path.display());
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    pub fn parse(s: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(s)
    }

    /// Applies `TETHER_VALIDATION=0|1` when set to something recognisable.
    pub fn apply_env(&mut self, value: Option<&str>) {
        match value.map(str::trim) {
            Some("1" | "true" | "on") => self.vulkan.validation = true,
            Some("0" | "false" | "off") => self.vulkan.validation = false,
            Some(other) => warn!("ignoring {VALIDATION_ENV}={other}"),
            None => {}
        }
    }

    pub fn to_settings(&self) -> Settings {
        Settings {
            app_name: self.app.name.clone(),
            api_version: api_version(&self.vulkan.api_version),
            validation: self
                .vulkan
                .validation
                .then(|| self.vulkan.validation_level.into()),
            criteria: Criteria {
                device_types: self
                    .selection
                    .device_types
                    .iter()
                    .map(|&ty| ty.into())
                    .collect(),
                ..Criteria::default()
            },
        }
    }
}

/// "1.2" -> `VK_API_VERSION_1_2`. Anything unparsable means 1.0.
fn api_version(s: &str) -> u32 {
    let mut parts = s.trim().splitn(2, '.').map(str::parse::<u32>);
    match (parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor))) => vk::make_api_version(0, major, minor, 0),
        (Some(Ok(major)), None) => vk::make_api_version(0, major, 0, 0),
        _ => {
            warn!("bad api_version `{s}`, using 1.0");
            vk::API_VERSION_1_0
        }
    }
}
