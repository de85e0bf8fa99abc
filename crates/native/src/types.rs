//! Handles, message codes and descriptors shared by every backend.

use serde::{Deserialize, Serialize};

/// Base of the application-private message range (`WM_USER`).
pub const WM_USER: u32 = 0x0400;

/// Tray notifications: `wparam` = icon id, low word of `lparam` = event code.
pub const TRAY_NOTIFY_MESSAGE: u32 = WM_USER + 20;
/// A menu item changed; `wparam` = item id.
pub const ITEM_UPDATE_MESSAGE: u32 = WM_USER + 21;
/// Ends the dispatcher loop.
pub const END_LOOP_MESSAGE: u32 = WM_USER + 22;
/// Dismisses the popup tracked through the receiving window.
pub const CLOSE_POPUP_MESSAGE: u32 = WM_USER + 23;

/// Native sub-event codes delivered with [`TRAY_NOTIFY_MESSAGE`].
pub mod event_code {
    use super::WM_USER;

    pub const MOUSE_MOVE: u32 = 0x0200;
    pub const LBUTTON_DOWN: u32 = 0x0201;
    pub const LBUTTON_UP: u32 = 0x0202;
    pub const LBUTTON_DBLCLK: u32 = 0x0203;
    pub const RBUTTON_DOWN: u32 = 0x0204;
    pub const RBUTTON_UP: u32 = 0x0205;
    pub const RBUTTON_DBLCLK: u32 = 0x0206;
    pub const MBUTTON_DOWN: u32 = 0x0207;
    pub const MBUTTON_UP: u32 = 0x0208;
    pub const MBUTTON_DBLCLK: u32 = 0x0209;
    /// `NIN_BALLOONTIMEOUT`.
    pub const BALLOON_TIMEOUT: u32 = WM_USER + 4;
    /// `NIN_BALLOONUSERCLICK`.
    pub const BALLOON_USER_CLICK: u32 = WM_USER + 5;
}

macro_rules! raw_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(isize);

        impl $name {
            pub const fn from_raw(raw: isize) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> isize {
                self.0
            }
        }
    };
}

raw_handle!(
    /// A native window (`HWND`).
    WindowHandle
);
raw_handle!(
    /// A native popup menu (`HMENU`).
    MenuHandle
);
raw_handle!(
    /// A native icon (`HICON`). Never destroyed by traykit.
    IconHandle
);

/// Purpose of a window created through a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// The dispatcher's tray message window.
    Message,
    /// A transient, invisible owner for one popup.
    PopupOwner,
}

/// Messages delivered to a [`WindowProc`](crate::WindowProc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMessage {
    TrayNotify { icon_id: u32, event: u32 },
    ItemUpdate { item_id: u32 },
    EndLoop,
    ClosePopup,
    /// The popup modal loop started (`WM_ENTERMENULOOP`).
    MenuLoopEntered,
    /// The popup modal loop ended (`WM_EXITMENULOOP`).
    MenuLoopExited,
}

impl WindowMessage {
    /// The private message code this message travels under.
    pub fn code(self) -> u32 {
        match self {
            Self::TrayNotify { .. } => TRAY_NOTIFY_MESSAGE,
            Self::ItemUpdate { .. } => ITEM_UPDATE_MESSAGE,
            Self::EndLoop => END_LOOP_MESSAGE,
            Self::ClosePopup => CLOSE_POPUP_MESSAGE,
            Self::MenuLoopEntered => 0x0211,
            Self::MenuLoopExited => 0x0212,
        }
    }
}

/// `Shell_NotifyIcon` verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyAction {
    Add,
    Modify,
    Delete,
}

/// Fields of a tray notify call. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyRequest {
    pub window: WindowHandle,
    pub icon_id: u32,
    pub callback_message: Option<u32>,
    pub tip: Option<String>,
    pub icon: Option<IconHandle>,
}

impl NotifyRequest {
    pub fn new(window: WindowHandle, icon_id: u32) -> Self {
        Self {
            window,
            icon_id,
            callback_message: None,
            tip: None,
            icon: None,
        }
    }
}

/// Native item type flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeItemType {
    Separator,
    String,
    Check { radio: bool },
    Submenu(MenuHandle),
}

/// Everything written into one native menu entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDescriptor {
    pub id: u32,
    pub item_type: NativeItemType,
    pub label: Option<String>,
    pub enabled: bool,
    pub checked: bool,
    /// Update counter stored in the entry's user-data slot.
    pub synced_counter: u64,
}

/// What [`NativeBackend::menu_item_info`](crate::NativeBackend::menu_item_info) reads back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeItemInfo {
    pub id: u32,
    pub synced_counter: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    #[default]
    Top,
    Center,
    Bottom,
}

/// Anchor and flags for a blocking popup-track call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupRequest {
    pub position: Point,
    pub horizontal: HorizontalAlign,
    pub vertical: VerticalAlign,
    pub allow_right_click: bool,
}
