//! Runtime configuration.
//!
//! Stored as TOML. Every field is optional:
//!
//! ```toml
//! window_class = "TrayKitWindowClass"
//! window_title = "TrayKitWindow"
//! default_tip = "traykit"
//!
//! [popup]
//! horizontal_align = "left"   # left | center | right
//! vertical_align = "top"      # top | center | bottom
//! allow_right_click = false
//! ```

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use traykit_native::{HorizontalAlign, VerticalAlign};

use crate::error::Result;

/// traykit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Name of the registered native window class.
    #[serde(default = "default_window_class")]
    pub window_class: String,

    /// Title of the hidden message and popup-owner windows.
    #[serde(default = "default_window_title")]
    pub window_title: String,

    /// Tooltip used when an icon is created without one.
    #[serde(default = "default_tip")]
    pub default_tip: String,

    /// Defaults for [`PopupOptions::from_config`](crate::PopupOptions::from_config).
    #[serde(default)]
    pub popup: PopupDefaults,
}

/// The `[popup]` table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupDefaults {
    #[serde(default)]
    pub horizontal_align: HorizontalAlign,

    #[serde(default)]
    pub vertical_align: VerticalAlign,

    /// Let the right mouse button select items.
    #[serde(default)]
    pub allow_right_click: bool,
}

fn default_window_class() -> String {
    "TrayKitWindowClass".into()
}

fn default_window_title() -> String {
    "TrayKitWindow".into()
}

fn default_tip() -> String {
    "traykit".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_class: default_window_class(),
            window_title: default_window_title(),
            default_tip: default_tip(),
            popup: PopupDefaults::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Loads configuration from `path`, falling back to the defaults when the
    /// file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)?;
                tracing::debug!(path = %path.display(), "configuration loaded");
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
