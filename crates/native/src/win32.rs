//! Win32 backend built on `windows-sys`.

use std::ffi::c_void;
use std::mem;
use std::ptr;
use std::sync::Arc;

use tracing::{debug, trace};
use windows_sys::Win32::Foundation::{
    ERROR_CLASS_ALREADY_EXISTS, GetLastError, HWND, LPARAM, LRESULT, POINT, SetLastError, WPARAM,
};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::Shell::{
    NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NIM_MODIFY, NOTIFYICONDATAW,
    Shell_NotifyIconW,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CW_USEDEFAULT, CreatePopupMenu, CreateWindowExW, DefWindowProcW, DestroyMenu, DestroyWindow,
    DispatchMessageW, EndMenu, GWLP_USERDATA, GetCursorPos, GetMenuItemCount, GetMenuItemInfoW,
    GetMessageW, HMENU, InsertMenuItemW, MENUITEMINFOW, MF_BYPOSITION, MFS_CHECKED, MFS_DISABLED,
    MFS_ENABLED, MFT_RADIOCHECK, MFT_SEPARATOR, MFT_STRING, MIIM_DATA, MIIM_FTYPE, MIIM_ID,
    MIIM_STATE, MIIM_STRING, MIIM_SUBMENU, MSG, PostMessageW, PostQuitMessage, RegisterClassW,
    RemoveMenu, SetForegroundWindow, SetMenuItemInfoW, TPM_BOTTOMALIGN, TPM_CENTERALIGN,
    TPM_LEFTALIGN, TPM_RETURNCMD, TPM_RIGHTALIGN, TPM_RIGHTBUTTON, TPM_TOPALIGN, TPM_VCENTERALIGN,
    TrackPopupMenu, TranslateMessage, WM_ENTERMENULOOP, WM_EXITMENULOOP, WNDCLASSW, WS_OVERLAPPED,
    WS_SYSMENU,
};

use crate::backend::{NativeBackend, WindowProc};
use crate::error::{ERROR_GEN_FAILURE, NativeError, NativeResult};
use crate::types::{
    CLOSE_POPUP_MESSAGE, END_LOOP_MESSAGE, HorizontalAlign, ITEM_UPDATE_MESSAGE, ItemDescriptor,
    MenuHandle, NativeItemInfo, NativeItemType, NotifyAction, NotifyRequest, Point, PopupRequest,
    TRAY_NOTIFY_MESSAGE, VerticalAlign, WindowHandle, WindowKind, WindowMessage,
};

#[cfg(target_pointer_width = "64")]
use windows_sys::Win32::UI::WindowsAndMessaging::{GetWindowLongPtrW, SetWindowLongPtrW};
#[cfg(target_pointer_width = "32")]
use windows_sys::Win32::UI::WindowsAndMessaging::{
    GetWindowLongW as GetWindowLongPtrW, SetWindowLongW as SetWindowLongPtrW,
};

/// Each window owns a boxed `Arc<dyn WindowProc>` in its `GWLP_USERDATA`
/// slot, installed by `create_window` and freed by `destroy_window`.
type ProcSlot = Arc<dyn WindowProc>;

fn window_proc(hwnd: HWND) -> Option<ProcSlot> {
    let slot = unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *const ProcSlot;
    // SAFETY: a non-null slot was stored by `create_window` and stays valid
    // until `destroy_window`, which runs on this window's thread.
    unsafe { slot.as_ref() }.cloned()
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn last_error(operation: &'static str) -> NativeError {
    let code = unsafe { GetLastError() };
    NativeError::new(operation, if code == 0 { ERROR_GEN_FAILURE } else { code })
}

fn hwnd(window: WindowHandle) -> HWND {
    window.raw() as HWND
}

fn hmenu(menu: MenuHandle) -> HMENU {
    menu.raw() as HMENU
}

fn translate(msg: u32, wparam: WPARAM, lparam: LPARAM) -> Option<WindowMessage> {
    match msg {
        TRAY_NOTIFY_MESSAGE => Some(WindowMessage::TrayNotify {
            icon_id: wparam as u32,
            event: (lparam as u32) & 0xFFFF,
        }),
        ITEM_UPDATE_MESSAGE => Some(WindowMessage::ItemUpdate {
            item_id: wparam as u32,
        }),
        END_LOOP_MESSAGE => Some(WindowMessage::EndLoop),
        CLOSE_POPUP_MESSAGE => Some(WindowMessage::ClosePopup),
        WM_ENTERMENULOOP => Some(WindowMessage::MenuLoopEntered),
        WM_EXITMENULOOP => Some(WindowMessage::MenuLoopExited),
        _ => None,
    }
}

unsafe extern "system" fn wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if let Some(message) = translate(msg, wparam, lparam) {
        if let Some(proc_) = window_proc(hwnd) {
            proc_.handle(WindowHandle::from_raw(hwnd as isize), message);
        }
        if !matches!(
            message,
            WindowMessage::MenuLoopEntered | WindowMessage::MenuLoopExited
        ) {
            return 0;
        }
    }
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

/// Native backend for Windows.
///
/// Registers its window class on construction; creating a second backend
/// with the same class name reuses the registration.
pub struct Win32Backend {
    class_name: Vec<u16>,
    window_title: Vec<u16>,
    instance: isize,
}

impl Win32Backend {
    pub fn new(class_name: &str, window_title: &str) -> NativeResult<Self> {
        let class_name = wide(class_name);
        let instance = unsafe { GetModuleHandleW(ptr::null()) };
        if instance.is_null() {
            return Err(last_error("GetModuleHandle"));
        }

        let mut class: WNDCLASSW = unsafe { mem::zeroed() };
        class.lpfnWndProc = Some(wnd_proc);
        class.hInstance = instance;
        class.lpszClassName = class_name.as_ptr();
        if unsafe { RegisterClassW(&class) } == 0 {
            let code = unsafe { GetLastError() };
            if code != ERROR_CLASS_ALREADY_EXISTS {
                return Err(NativeError::new("RegisterClass", code));
            }
            debug!("window class already registered");
        }

        Ok(Self {
            class_name,
            window_title: wide(window_title),
            instance: instance as isize,
        })
    }

    fn item_info(item: &ItemDescriptor, label: &mut Vec<u16>) -> MENUITEMINFOW {
        let mut info: MENUITEMINFOW = unsafe { mem::zeroed() };
        info.cbSize = mem::size_of::<MENUITEMINFOW>() as u32;
        info.fMask = MIIM_FTYPE | MIIM_ID | MIIM_STATE | MIIM_DATA | MIIM_SUBMENU;
        info.wID = item.id;
        info.dwItemData = item.synced_counter as usize;
        info.fState = if item.enabled { MFS_ENABLED } else { MFS_DISABLED }
            | if item.checked { MFS_CHECKED } else { 0 };
        info.fType = match item.item_type {
            NativeItemType::Separator => MFT_SEPARATOR,
            NativeItemType::String => MFT_STRING,
            NativeItemType::Check { radio: true } => MFT_STRING | MFT_RADIOCHECK,
            NativeItemType::Check { radio: false } => MFT_STRING,
            NativeItemType::Submenu(sub) => {
                info.hSubMenu = hmenu(sub);
                MFT_STRING
            }
        };
        if item.item_type != NativeItemType::Separator {
            *label = wide(item.label.as_deref().unwrap_or_default());
            info.fMask |= MIIM_STRING;
            info.dwTypeData = label.as_mut_ptr();
            info.cch = (label.len() - 1) as u32;
        }
        info
    }
}

impl NativeBackend for Win32Backend {
    fn create_window(
        &self,
        kind: WindowKind,
        proc_: Arc<dyn WindowProc>,
    ) -> NativeResult<WindowHandle> {
        let hwnd = unsafe {
            CreateWindowExW(
                0,
                self.class_name.as_ptr(),
                self.window_title.as_ptr(),
                WS_OVERLAPPED | WS_SYSMENU,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                ptr::null_mut(),
                ptr::null_mut(),
                self.instance as *mut c_void,
                ptr::null(),
            )
        };
        if hwnd.is_null() {
            return Err(last_error("CreateWindowEx"));
        }
        let slot = Box::into_raw(Box::new(proc_));
        unsafe { SetLastError(0) };
        let previous = unsafe { SetWindowLongPtrW(hwnd, GWLP_USERDATA, slot as _) };
        if previous == 0 {
            let code = unsafe { GetLastError() };
            if code != 0 {
                // SAFETY: the slot was never published to the window.
                drop(unsafe { Box::from_raw(slot) });
                unsafe { DestroyWindow(hwnd) };
                return Err(NativeError::new("SetWindowLongPtr", code));
            }
        }
        trace!(window = hwnd as isize, ?kind, "window created");
        Ok(WindowHandle::from_raw(hwnd as isize))
    }

    fn destroy_window(&self, window: WindowHandle) -> NativeResult<()> {
        let slot = unsafe { GetWindowLongPtrW(hwnd(window), GWLP_USERDATA) } as *mut ProcSlot;
        if unsafe { DestroyWindow(hwnd(window)) } == 0 {
            return Err(last_error("DestroyWindow"));
        }
        if !slot.is_null() {
            // SAFETY: the window is gone, so nothing can reach the slot anymore.
            drop(unsafe { Box::from_raw(slot) });
        }
        Ok(())
    }

    fn post_message(&self, window: WindowHandle, message: WindowMessage) -> NativeResult<()> {
        let (wparam, lparam) = match message {
            WindowMessage::TrayNotify { icon_id, event } => (icon_id as WPARAM, event as LPARAM),
            WindowMessage::ItemUpdate { item_id } => (item_id as WPARAM, 0),
            _ => (0, 0),
        };
        if unsafe { PostMessageW(hwnd(window), message.code(), wparam, lparam) } == 0 {
            return Err(last_error("PostMessage"));
        }
        Ok(())
    }

    fn run_message_loop(&self) -> NativeResult<()> {
        let mut msg: MSG = unsafe { mem::zeroed() };
        loop {
            match unsafe { GetMessageW(&mut msg, ptr::null_mut(), 0, 0) } {
                0 => return Ok(()),
                -1 => return Err(last_error("GetMessage")),
                _ => unsafe {
                    TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                },
            }
        }
    }

    fn quit_message_loop(&self) {
        unsafe { PostQuitMessage(0) };
    }

    fn notify_icon(&self, action: NotifyAction, request: &NotifyRequest) -> NativeResult<()> {
        let mut data: NOTIFYICONDATAW = unsafe { mem::zeroed() };
        data.cbSize = mem::size_of::<NOTIFYICONDATAW>() as u32;
        data.hWnd = hwnd(request.window);
        data.uID = request.icon_id;
        if let Some(message) = request.callback_message {
            data.uFlags |= NIF_MESSAGE;
            data.uCallbackMessage = message;
        }
        if let Some(icon) = request.icon {
            data.uFlags |= NIF_ICON;
            data.hIcon = icon.raw() as *mut c_void;
        }
        if let Some(tip) = &request.tip {
            data.uFlags |= NIF_TIP;
            let capacity = data.szTip.len() - 1;
            for (slot, unit) in data.szTip.iter_mut().zip(tip.encode_utf16().take(capacity)) {
                *slot = unit;
            }
        }

        let (verb, operation) = match action {
            NotifyAction::Add => (NIM_ADD, "Shell_NotifyIcon(NIM_ADD)"),
            NotifyAction::Modify => (NIM_MODIFY, "Shell_NotifyIcon(NIM_MODIFY)"),
            NotifyAction::Delete => (NIM_DELETE, "Shell_NotifyIcon(NIM_DELETE)"),
        };
        if unsafe { Shell_NotifyIconW(verb, &data) } == 0 {
            return Err(last_error(operation));
        }
        Ok(())
    }

    fn create_popup_menu(&self) -> NativeResult<MenuHandle> {
        let menu = unsafe { CreatePopupMenu() };
        if menu.is_null() {
            return Err(last_error("CreatePopupMenu"));
        }
        Ok(MenuHandle::from_raw(menu as isize))
    }

    fn destroy_menu(&self, menu: MenuHandle) -> NativeResult<()> {
        if unsafe { DestroyMenu(hmenu(menu)) } == 0 {
            return Err(last_error("DestroyMenu"));
        }
        Ok(())
    }

    fn menu_item_count(&self, menu: MenuHandle) -> NativeResult<usize> {
        let count = unsafe { GetMenuItemCount(hmenu(menu)) };
        usize::try_from(count).map_err(|_| last_error("GetMenuItemCount"))
    }

    fn menu_item_info(&self, menu: MenuHandle, position: usize) -> NativeResult<NativeItemInfo> {
        let mut info: MENUITEMINFOW = unsafe { mem::zeroed() };
        info.cbSize = mem::size_of::<MENUITEMINFOW>() as u32;
        info.fMask = MIIM_ID | MIIM_DATA;
        if unsafe { GetMenuItemInfoW(hmenu(menu), position as u32, 1, &mut info) } == 0 {
            return Err(last_error("GetMenuItemInfo"));
        }
        Ok(NativeItemInfo {
            id: info.wID,
            synced_counter: info.dwItemData as u64,
        })
    }

    fn insert_menu_item(
        &self,
        menu: MenuHandle,
        position: usize,
        item: &ItemDescriptor,
    ) -> NativeResult<()> {
        let mut label = Vec::new();
        let info = Self::item_info(item, &mut label);
        if unsafe { InsertMenuItemW(hmenu(menu), position as u32, 1, &info) } == 0 {
            return Err(last_error("InsertMenuItem"));
        }
        Ok(())
    }

    fn set_menu_item(
        &self,
        menu: MenuHandle,
        position: usize,
        item: &ItemDescriptor,
    ) -> NativeResult<()> {
        let mut label = Vec::new();
        let info = Self::item_info(item, &mut label);
        if unsafe { SetMenuItemInfoW(hmenu(menu), position as u32, 1, &info) } == 0 {
            return Err(last_error("SetMenuItemInfo"));
        }
        Ok(())
    }

    fn remove_menu_item(&self, menu: MenuHandle, position: usize) -> NativeResult<()> {
        if unsafe { RemoveMenu(hmenu(menu), position as u32, MF_BYPOSITION) } == 0 {
            return Err(last_error("RemoveMenu"));
        }
        Ok(())
    }

    fn cursor_position(&self) -> NativeResult<Point> {
        let mut point = POINT { x: 0, y: 0 };
        if unsafe { GetCursorPos(&mut point) } == 0 {
            return Err(last_error("GetCursorPos"));
        }
        Ok(Point {
            x: point.x,
            y: point.y,
        })
    }

    fn set_foreground_window(&self, window: WindowHandle) -> NativeResult<()> {
        if unsafe { SetForegroundWindow(hwnd(window)) } == 0 {
            return Err(last_error("SetForegroundWindow"));
        }
        Ok(())
    }

    fn track_popup_menu(
        &self,
        menu: MenuHandle,
        owner: WindowHandle,
        request: &PopupRequest,
    ) -> NativeResult<Option<u32>> {
        let mut flags = TPM_RETURNCMD;
        flags |= match request.horizontal {
            HorizontalAlign::Left => TPM_LEFTALIGN,
            HorizontalAlign::Center => TPM_CENTERALIGN,
            HorizontalAlign::Right => TPM_RIGHTALIGN,
        };
        flags |= match request.vertical {
            VerticalAlign::Top => TPM_TOPALIGN,
            VerticalAlign::Center => TPM_VCENTERALIGN,
            VerticalAlign::Bottom => TPM_BOTTOMALIGN,
        };
        if request.allow_right_click {
            flags |= TPM_RIGHTBUTTON;
        }

        unsafe { SetLastError(0) };
        let selected = unsafe {
            TrackPopupMenu(
                hmenu(menu),
                flags,
                request.position.x,
                request.position.y,
                0,
                hwnd(owner),
                ptr::null(),
            )
        };
        if selected == 0 {
            let code = unsafe { GetLastError() };
            if code != 0 {
                return Err(NativeError::new("TrackPopupMenu", code));
            }
            return Ok(None);
        }
        Ok(Some(selected as u32))
    }

    fn end_menu(&self) -> NativeResult<()> {
        if unsafe { EndMenu() } == 0 {
            return Err(last_error("EndMenu"));
        }
        Ok(())
    }
}
