use std::{fs, path::Path};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::board::BoardTable;
use crate::error::PioError;
use crate::input::KeyCode;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeTrigger {
    #[default]
    None,
    Rising,
    Falling,
    Both,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveType {
    #[default]
    High,
    Low,
}

impl ActiveType {
    /// Maps between logical and electrical levels. The mapping is its own inverse.
    pub fn apply(self, level: bool) -> bool {
        match self {
            ActiveType::High => level,
            ActiveType::Low => !level,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Sample {
    #[default]
    Button,
    Led,
    Driver,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LineConfig {
    pub chip: String,
    pub line: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub sample: Sample,
    #[serde(default)]
    pub button_key: KeyCode,
    #[serde(default)]
    pub boards: BoardTable,
    #[serde(default)]
    pub lines: FxHashMap<String, LineConfig>,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PioError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| PioError::Config(format!("Failed to read config: {e}")))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, PioError> {
        serde_json::from_str(contents)
            .map_err(|e| PioError::Config(format!("Invalid config json: {e}")))
    }
}
