//! Error types for tray icons, menus and the message loop.

use traykit_native::NativeError;
use traykit_registry::RegistryError;

use crate::menu_item::ItemKind;

/// Errors produced by traykit.
#[derive(Debug, thiserror::Error)]
pub enum TrayError {
    #[error(transparent)]
    Native(#[from] NativeError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("tray icon {0} has been destroyed")]
    Destroyed(u32),

    #[error("the tray message loop is already running")]
    LoopAlreadyRunning,

    #[error("submenu would create a circular reference")]
    CircularReference,

    #[error("this menu is already being shown")]
    PopupInProgress,

    #[error("{kind} item has no {property}")]
    UnsupportedProperty {
        kind: ItemKind,
        property: &'static str,
    },

    #[error("index {index} out of range for menu with {len} items")]
    IndexOutOfRange { index: isize, len: usize },

    /// The in-memory tree and the native menu disagree.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, TrayError>;
