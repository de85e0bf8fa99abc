//! Tray icons and popup menus that any thread may mutate.
//!
//! A [`TrayRuntime`] owns the native backend and the id registries. One
//! thread runs [`TrayRuntime::run`], which owns the tray message window and
//! dispatches icon callbacks; any other thread may create, change and destroy
//! icons and menu items concurrently.
//!
//! Menus are shown with [`Menu::popup`], which blocks the calling thread. An
//! item changed while a menu is open is pushed to the thread tracking it as
//! a message, so native menu handles are only touched by their owner.
//!
//! # Platform notes
//! - Windows: Win32 `Shell_NotifyIcon` and `TrackPopupMenu`.
//! - Elsewhere: an in-process headless backend with the same semantics.

mod callback;
mod config;
mod dispatcher;
mod error;
mod event;
mod icon;
mod menu;
mod menu_item;
mod popup;
mod runtime;
mod sync;

#[cfg(test)]
mod testing;

pub use callback::{CallbackSlot, IconCallback, ParseSlotError};
pub use config::{Config, PopupDefaults};
pub use error::{Result, TrayError};
pub use event::WaitTimeout;
pub use icon::TrayIcon;
pub use menu::{Menu, PopupOptions};
pub use menu_item::{ItemCallback, ItemKind, MenuItem};
pub use runtime::TrayRuntime;

pub use traykit_native::{HorizontalAlign, IconHandle, Point, VerticalAlign};
