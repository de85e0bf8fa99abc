//! Native backends for traykit.
//!
//! [`NativeBackend`] is the only place traykit touches the operating system.
//! On Windows the real implementation is [`Win32Backend`]; every platform also
//! gets [`HeadlessBackend`], an in-process simulation used by tests and on
//! systems without a Win32 tray.

use std::sync::Arc;

mod backend;
mod error;
pub mod headless;
mod types;

#[cfg(windows)]
mod win32;

pub use backend::{NativeBackend, WindowProc};
pub use error::{
    ERROR_ALREADY_EXISTS, ERROR_GEN_FAILURE, ERROR_INVALID_MENU_HANDLE,
    ERROR_INVALID_WINDOW_HANDLE, ERROR_MENU_ITEM_NOT_FOUND, ERROR_NOT_FOUND, NativeError,
    NativeResult,
};
pub use headless::HeadlessBackend;
pub use types::{
    CLOSE_POPUP_MESSAGE, END_LOOP_MESSAGE, HorizontalAlign, ITEM_UPDATE_MESSAGE, IconHandle,
    ItemDescriptor, MenuHandle, NativeItemInfo, NativeItemType, NotifyAction, NotifyRequest,
    Point, PopupRequest, TRAY_NOTIFY_MESSAGE, VerticalAlign, WM_USER, WindowHandle, WindowKind,
    WindowMessage, event_code,
};
#[cfg(windows)]
pub use win32::Win32Backend;

/// The backend for the current platform.
#[cfg(windows)]
pub fn platform_backend(
    class_name: &str,
    window_title: &str,
) -> NativeResult<Arc<dyn NativeBackend>> {
    Ok(Arc::new(Win32Backend::new(class_name, window_title)?))
}

/// The backend for the current platform.
#[cfg(not(windows))]
pub fn platform_backend(
    _class_name: &str,
    _window_title: &str,
) -> NativeResult<Arc<dyn NativeBackend>> {
    Ok(Arc::new(HeadlessBackend::new()))
}
