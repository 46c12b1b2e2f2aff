//! User-facing chat preferences, persisted under the `chat-settings` key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::local_store::{LocalStore, SETTINGS_KEY};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSpeed {
    Fast,
    #[default]
    Normal,
    Thoughtful,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Auto,
}

/// Fields missing from a stored object take their default.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    pub animations_enabled: bool,
    pub sound_enabled: bool,
    pub response_speed: ResponseSpeed,
    pub theme: Theme,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            animations_enabled: true,
            sound_enabled: false,
            response_speed: ResponseSpeed::Normal,
            theme: Theme::Light,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown setting '{0}' (try animations, sound, speed, theme)")]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

impl ChatSettings {
    pub fn load(store: &LocalStore) -> Self {
        store.get(SETTINGS_KEY).unwrap_or_default()
    }

    pub fn save(&self, store: &LocalStore) {
        store.set(SETTINGS_KEY, self);
    }

    /// Updates one setting from its textual form, e.g. `("speed", "fast")`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            "animations" | "animationsEnabled" => {
                self.animations_enabled = parse_flag("animations", value)?;
            }
            "sound" | "soundEnabled" => {
                self.sound_enabled = parse_flag("sound", value)?;
            }
            "speed" | "responseSpeed" => {
                self.response_speed = value.parse().map_err(|_| SettingsError::InvalidValue {
                    key: "speed",
                    value: value.to_string(),
                })?;
            }
            "theme" => {
                self.theme = value.parse().map_err(|_| SettingsError::InvalidValue {
                    key: "theme",
                    value: value.to_string(),
                })?;
            }
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, SettingsError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(SettingsError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

impl FromStr for ResponseSpeed {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(ResponseSpeed::Fast),
            "normal" => Ok(ResponseSpeed::Normal),
            "thoughtful" => Ok(ResponseSpeed::Thoughtful),
            _ => Err(()),
        }
    }
}

impl FromStr for Theme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "auto" => Ok(Theme::Auto),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ResponseSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseSpeed::Fast => "fast",
            ResponseSpeed::Normal => "normal",
            ResponseSpeed::Thoughtful => "thoughtful",
        })
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Light => "light",
            Theme::Auto => "auto",
        })
    }
}
