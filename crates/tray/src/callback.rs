//! Tray icon callback slots.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use traykit_native::event_code;

use crate::icon::TrayIcon;

/// Callback invoked on the dispatcher thread with the icon that fired.
pub type IconCallback = Arc<dyn Fn(&TrayIcon) + Send + Sync>;

/// The tray events an icon can react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackSlot {
    MouseMove,
    LeftButtonDown,
    LeftButtonUp,
    LeftDoubleClick,
    RightButtonDown,
    RightButtonUp,
    RightDoubleClick,
    MiddleButtonDown,
    MiddleButtonUp,
    MiddleDoubleClick,
    NotificationClick,
    NotificationTimeout,
}

pub(crate) const SLOT_COUNT: usize = 12;

impl CallbackSlot {
    pub const ALL: [Self; SLOT_COUNT] = [
        Self::MouseMove,
        Self::LeftButtonDown,
        Self::LeftButtonUp,
        Self::LeftDoubleClick,
        Self::RightButtonDown,
        Self::RightButtonUp,
        Self::RightDoubleClick,
        Self::MiddleButtonDown,
        Self::MiddleButtonUp,
        Self::MiddleDoubleClick,
        Self::NotificationClick,
        Self::NotificationTimeout,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Bit of this slot in [`TrayIcon::callback_flags`].
    pub fn bit(self) -> u16 {
        1 << self.index()
    }

    /// Maps a native tray sub-event code to its slot.
    pub fn from_event(code: u32) -> Option<Self> {
        let slot = match code {
            event_code::MOUSE_MOVE => Self::MouseMove,
            event_code::LBUTTON_DOWN => Self::LeftButtonDown,
            event_code::LBUTTON_UP => Self::LeftButtonUp,
            event_code::LBUTTON_DBLCLK => Self::LeftDoubleClick,
            event_code::RBUTTON_DOWN => Self::RightButtonDown,
            event_code::RBUTTON_UP => Self::RightButtonUp,
            event_code::RBUTTON_DBLCLK => Self::RightDoubleClick,
            event_code::MBUTTON_DOWN => Self::MiddleButtonDown,
            event_code::MBUTTON_UP => Self::MiddleButtonUp,
            event_code::MBUTTON_DBLCLK => Self::MiddleDoubleClick,
            event_code::BALLOON_USER_CLICK => Self::NotificationClick,
            event_code::BALLOON_TIMEOUT => Self::NotificationTimeout,
            _ => return None,
        };
        Some(slot)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MouseMove => "mouse_move",
            Self::LeftButtonDown => "mouse_left_button_down",
            Self::LeftButtonUp => "mouse_left_button_up",
            Self::LeftDoubleClick => "mouse_left_double_click",
            Self::RightButtonDown => "mouse_right_button_down",
            Self::RightButtonUp => "mouse_right_button_up",
            Self::RightDoubleClick => "mouse_right_double_click",
            Self::MiddleButtonDown => "mouse_mid_button_down",
            Self::MiddleButtonUp => "mouse_mid_button_up",
            Self::MiddleDoubleClick => "mouse_mid_double_click",
            Self::NotificationClick => "notification_click",
            Self::NotificationTimeout => "notification_timeout",
        }
    }
}

impl fmt::Display for CallbackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when parsing an unknown slot name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown callback slot: {0}")]
pub struct ParseSlotError(pub String);

impl FromStr for CallbackSlot {
    type Err = ParseSlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|slot| slot.name() == s)
            .ok_or_else(|| ParseSlotError(s.to_string()))
    }
}
