//! The seam between traykit and the operating system.

use std::sync::Arc;

use crate::error::NativeResult;
use crate::types::{
    ItemDescriptor, MenuHandle, NativeItemInfo, NotifyAction, NotifyRequest, Point,
    PopupRequest, WindowHandle, WindowKind, WindowMessage,
};

/// Receives the messages delivered to one window.
///
/// Always invoked on the thread that created the window.
pub trait WindowProc: Send + Sync {
    fn handle(&self, window: WindowHandle, message: WindowMessage);
}

/// Native tray, window and menu primitives.
///
/// Windows belong to the thread that created them: their messages are only
/// delivered while that thread runs [`run_message_loop`](Self::run_message_loop)
/// or [`track_popup_menu`](Self::track_popup_menu).
pub trait NativeBackend: Send + Sync {
    /// Creates a hidden window owned by the calling thread.
    fn create_window(
        &self,
        kind: WindowKind,
        proc_: Arc<dyn WindowProc>,
    ) -> NativeResult<WindowHandle>;

    fn destroy_window(&self, window: WindowHandle) -> NativeResult<()>;

    /// Queues `message` for `window`. Callable from any thread.
    fn post_message(&self, window: WindowHandle, message: WindowMessage) -> NativeResult<()>;

    /// Dispatches the calling thread's messages until
    /// [`quit_message_loop`](Self::quit_message_loop) is called on it.
    fn run_message_loop(&self) -> NativeResult<()>;

    /// Makes the calling thread's message loop return.
    fn quit_message_loop(&self);

    fn notify_icon(&self, action: NotifyAction, request: &NotifyRequest) -> NativeResult<()>;

    fn create_popup_menu(&self) -> NativeResult<MenuHandle>;

    /// Destroys `menu`. Entries must be removed first so nested submenus survive.
    fn destroy_menu(&self, menu: MenuHandle) -> NativeResult<()>;

    fn menu_item_count(&self, menu: MenuHandle) -> NativeResult<usize>;

    fn menu_item_info(&self, menu: MenuHandle, position: usize) -> NativeResult<NativeItemInfo>;

    fn insert_menu_item(
        &self,
        menu: MenuHandle,
        position: usize,
        item: &ItemDescriptor,
    ) -> NativeResult<()>;

    fn set_menu_item(
        &self,
        menu: MenuHandle,
        position: usize,
        item: &ItemDescriptor,
    ) -> NativeResult<()>;

    /// Removes an entry without destroying an attached submenu.
    fn remove_menu_item(&self, menu: MenuHandle, position: usize) -> NativeResult<()>;

    fn cursor_position(&self) -> NativeResult<Point>;

    fn set_foreground_window(&self, window: WindowHandle) -> NativeResult<()>;

    /// Shows `menu` and blocks until it is dismissed.
    ///
    /// Returns the id of the selected item instead of posting a command.
    fn track_popup_menu(
        &self,
        menu: MenuHandle,
        owner: WindowHandle,
        request: &PopupRequest,
    ) -> NativeResult<Option<u32>>;

    /// Ends the popup being tracked on the calling thread.
    fn end_menu(&self) -> NativeResult<()>;
}
