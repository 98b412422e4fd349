//! Config persistence: a JSON5-tolerant (trailing commas, line comments)
//! load path and a strict JSON save path, stored at a platform config
//! directory located through the `directories` crate.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum StModel {
    St,
    Mega,
    Ste,
}

impl StModel {
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Mega,
            2 => Self::Ste,
            _ => Self::St,
        }
    }
}

/// RAM size selector: 0 -> 512KiB, 1 -> 1MiB, 2 -> 2MiB, 3 -> 4MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamConfiguration(pub u8);

impl RamConfiguration {
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self.0 {
            1 => 1024 * 1024,
            2 => 2 * 1024 * 1024,
            3 => 4 * 1024 * 1024,
            _ => 512 * 1024,
        }
    }
}

/// Recognized config keys, matching §6's schema exactly. Unknown keys
/// are ignored on load because we simply don't define fields for them;
/// every field defaults so a partial file still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtariConfig {
    #[serde(rename = "TOSPath")]
    pub tos_path: Option<PathBuf>,
    #[serde(rename = "STModel")]
    pub st_model: u8,
    #[serde(rename = "RAMConfiguration")]
    pub ram_configuration: u8,
    #[serde(rename = "MaxSpeed")]
    pub max_speed: bool,
    #[serde(rename = "FloppyImagePath")]
    pub floppy_image_path: Option<PathBuf>,
    #[serde(rename = "MouseXSensitivity")]
    pub mouse_x_sensitivity: i32,
    #[serde(rename = "MouseYSensitivity")]
    pub mouse_y_sensitivity: i32,
    #[serde(rename = "SampleRate")]
    pub sample_rate: u32,
    #[serde(rename = "DebugMode")]
    pub debug_mode: bool,
}

impl Default for AtariConfig {
    fn default() -> Self {
        Self {
            tos_path: None,
            st_model: 0,
            ram_configuration: 1,
            max_speed: false,
            floppy_image_path: None,
            mouse_x_sensitivity: 2,
            mouse_y_sensitivity: 2,
            sample_rate: 48_000,
            debug_mode: false,
        }
    }
}

impl AtariConfig {
    #[must_use]
    pub fn st_model(&self) -> StModel {
        StModel::from_code(self.st_model)
    }

    #[must_use]
    pub fn ram_configuration(&self) -> RamConfiguration {
        RamConfiguration(self.ram_configuration)
    }

    /// Platform config directory, matching the sibling workspaces'
    /// `directories::ProjectDirs` convention (no qualifier/org, just
    /// the app name).
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let dirs = directories::ProjectDirs::from("", "", "atari-st").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.json"))
    }

    /// Load from an explicit path (used for `--altconfig`) with JSON5
    /// tolerance: trailing commas and `//` line comments are accepted.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        json5::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Load from the default platform config path, falling back to
    /// defaults if the file does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Persist as strict, pretty-printed JSON.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let text = serde_json::to_string_pretty(self).expect("AtariConfig serializes infallibly");
        fs::write(path, text).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips_recognized_fields() {
        let dir = std::env::temp_dir().join("atari-st-config-test");
        let _ = fs::create_dir_all(&dir);
        let path = dir.join("config.json");

        let mut config = AtariConfig::default();
        config.tos_path = Some(PathBuf::from("/roms/tos.img"));
        config.ram_configuration = 2;
        config.mouse_x_sensitivity = 4;
        config.save_to(&path).unwrap();

        let loaded = AtariConfig::load_from(&path).unwrap();
        assert_eq!(loaded.tos_path, config.tos_path);
        assert_eq!(loaded.ram_configuration, 2);
        assert_eq!(loaded.mouse_x_sensitivity, 4);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_tolerates_trailing_commas_and_line_comments() {
        let dir = std::env::temp_dir().join("atari-st-config-test-json5");
        let _ = fs::create_dir_all(&dir);
        let path = dir.join("config.json5");
        fs::write(
            &path,
            r#"{
                // a comment
                "RAMConfiguration": 3,
                "MaxSpeed": true,
            }"#,
        )
        .unwrap();

        let loaded = AtariConfig::load_from(&path).unwrap();
        assert_eq!(loaded.ram_configuration, 3);
        assert!(loaded.max_speed);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = std::env::temp_dir().join("atari-st-config-test-unknown");
        let _ = fs::create_dir_all(&dir);
        let path = dir.join("config.json");
        fs::write(&path, r#"{"RAMConfiguration": 1, "SomethingFuture": 42}"#).unwrap();
        let loaded = AtariConfig::load_from(&path).unwrap();
        assert_eq!(loaded.ram_configuration, 1);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn ram_configuration_maps_codes_to_byte_sizes() {
        assert_eq!(RamConfiguration(0).bytes(), 512 * 1024);
        assert_eq!(RamConfiguration(1).bytes(), 1024 * 1024);
        assert_eq!(RamConfiguration(2).bytes(), 2 * 1024 * 1024);
        assert_eq!(RamConfiguration(3).bytes(), 4 * 1024 * 1024);
    }
}
