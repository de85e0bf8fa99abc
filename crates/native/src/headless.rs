//! In-process backend simulating windows, message queues, menus and the tray.
//!
//! Used on platforms without a native tray and by every test. Each thread
//! that creates a window gets its own message queue; messages posted to a
//! window are dispatched only while its thread runs the message loop or a
//! popup-tracking loop, mirroring Win32 thread affinity.
//!
//! Test hooks: per-operation call counters ([`HeadlessBackend::calls`]),
//! one-shot failure injection ([`HeadlessBackend::fail_next`]) and popup item
//! selection ([`HeadlessBackend::select_popup_item`]).

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::backend::{NativeBackend, WindowProc};
use crate::error::{
    ERROR_ALREADY_EXISTS, ERROR_GEN_FAILURE, ERROR_INVALID_MENU_HANDLE,
    ERROR_INVALID_WINDOW_HANDLE, ERROR_MENU_ITEM_NOT_FOUND, ERROR_NOT_FOUND, NativeError,
    NativeResult,
};
use crate::types::{
    IconHandle, ItemDescriptor, MenuHandle, NativeItemInfo, NativeItemType, NotifyAction,
    NotifyRequest, Point, PopupRequest, WindowHandle, WindowKind, WindowMessage,
};

/// Native operations counted by the headless backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeOp {
    CreateWindow,
    DestroyWindow,
    PostMessage,
    TrayAdd,
    TrayModify,
    TrayDelete,
    CreateMenu,
    DestroyMenu,
    ItemCount,
    ItemInfo,
    InsertItem,
    SetItem,
    RemoveItem,
    SetForeground,
    TrackPopup,
}

impl NativeOp {
    /// The Win32 call this operation stands for.
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateWindow => "CreateWindowEx",
            Self::DestroyWindow => "DestroyWindow",
            Self::PostMessage => "PostMessage",
            Self::TrayAdd => "Shell_NotifyIcon(NIM_ADD)",
            Self::TrayModify => "Shell_NotifyIcon(NIM_MODIFY)",
            Self::TrayDelete => "Shell_NotifyIcon(NIM_DELETE)",
            Self::CreateMenu => "CreatePopupMenu",
            Self::DestroyMenu => "DestroyMenu",
            Self::ItemCount => "GetMenuItemCount",
            Self::ItemInfo => "GetMenuItemInfo",
            Self::InsertItem => "InsertMenuItem",
            Self::SetItem => "SetMenuItemInfo",
            Self::RemoveItem => "RemoveMenu",
            Self::SetForeground => "SetForegroundWindow",
            Self::TrackPopup => "TrackPopupMenu",
        }
    }
}

/// An icon currently registered with the simulated tray.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayEntry {
    pub window: WindowHandle,
    pub tip: String,
    pub icon: Option<IconHandle>,
    pub callback_message: Option<u32>,
}

enum Queued {
    Window(WindowHandle, WindowMessage),
    Select { owner: WindowHandle, item_id: u32 },
    Quit,
}

#[derive(Default)]
struct ThreadQueue {
    messages: Mutex<VecDeque<Queued>>,
    available: Condvar,
}

impl ThreadQueue {
    fn push(&self, queued: Queued) {
        self.messages.lock().push_back(queued);
        self.available.notify_one();
    }

    fn pop(&self) -> Queued {
        let mut messages = self.messages.lock();
        loop {
            if let Some(queued) = messages.pop_front() {
                return queued;
            }
            self.available.wait(&mut messages);
        }
    }
}

struct HeadlessWindow {
    kind: WindowKind,
    thread: ThreadId,
    proc_: Arc<dyn WindowProc>,
}

#[derive(Default)]
struct State {
    windows: HashMap<WindowHandle, HeadlessWindow>,
    menus: HashMap<MenuHandle, Vec<ItemDescriptor>>,
    tray: BTreeMap<u32, TrayEntry>,
    /// Menus inside a tracking loop, with their owner window.
    tracking: HashMap<MenuHandle, WindowHandle>,
    last_popup: Option<(MenuHandle, PopupRequest)>,
}

thread_local! {
    static END_MENU_REQUESTED: Cell<bool> = const { Cell::new(false) };
}

/// Simulated native layer. See the module docs.
pub struct HeadlessBackend {
    state: Mutex<State>,
    queues: Mutex<HashMap<ThreadId, Arc<ThreadQueue>>>,
    calls: Mutex<HashMap<NativeOp, usize>>,
    failures: Mutex<HashMap<NativeOp, u32>>,
    cursor: Mutex<Point>,
    next_handle: AtomicIsize,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            queues: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            cursor: Mutex::new(Point::default()),
            next_handle: AtomicIsize::new(0x1_0000),
        }
    }

    /// Number of times `op` was attempted since the last reset.
    pub fn calls(&self, op: NativeOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Makes the next `op` fail with `code`.
    pub fn fail_next(&self, op: NativeOp, code: u32) {
        self.failures.lock().insert(op, code);
    }

    pub fn set_cursor_position(&self, position: Point) {
        *self.cursor.lock() = position;
    }

    pub fn tray_entry(&self, icon_id: u32) -> Option<TrayEntry> {
        self.state.lock().tray.get(&icon_id).cloned()
    }

    pub fn tray_entries(&self) -> Vec<(u32, TrayEntry)> {
        self.state
            .lock()
            .tray
            .iter()
            .map(|(id, entry)| (*id, entry.clone()))
            .collect()
    }

    /// Native entries of `menu`, or `None` if the handle is not live.
    pub fn menu_items(&self, menu: MenuHandle) -> Option<Vec<ItemDescriptor>> {
        self.state.lock().menus.get(&menu).cloned()
    }

    pub fn menu_exists(&self, menu: MenuHandle) -> bool {
        self.state.lock().menus.contains_key(&menu)
    }

    /// Live windows of the given kind.
    pub fn windows(&self, kind: WindowKind) -> Vec<WindowHandle> {
        let mut windows: Vec<WindowHandle> = self
            .state
            .lock()
            .windows
            .iter()
            .filter(|(_, w)| w.kind == kind)
            .map(|(handle, _)| *handle)
            .collect();
        windows.sort();
        windows
    }

    pub fn is_tracking(&self, menu: MenuHandle) -> bool {
        self.state.lock().tracking.contains_key(&menu)
    }

    /// The most recent popup request, with the menu it was made for.
    pub fn last_popup(&self) -> Option<(MenuHandle, PopupRequest)> {
        self.state.lock().last_popup
    }

    /// Selects `item_id` in the popup currently tracking `menu`.
    ///
    /// The item must be an enabled string or check entry somewhere in the
    /// tracked tree, reachable through enabled submenus.
    pub fn select_popup_item(&self, menu: MenuHandle, item_id: u32) -> NativeResult<()> {
        let (owner, thread) = {
            let state = self.state.lock();
            let owner = *state
                .tracking
                .get(&menu)
                .ok_or(NativeError::new("TrackPopupMenu", ERROR_NOT_FOUND))?;
            if !is_selectable(&state.menus, menu, item_id) {
                return Err(NativeError::new("TrackPopupMenu", ERROR_MENU_ITEM_NOT_FOUND));
            }
            let thread = state
                .windows
                .get(&owner)
                .map(|w| w.thread)
                .ok_or(NativeError::new("TrackPopupMenu", ERROR_INVALID_WINDOW_HANDLE))?;
            (owner, thread)
        };
        self.queue_for(thread).push(Queued::Select { owner, item_id });
        Ok(())
    }

    fn record(&self, op: NativeOp) -> NativeResult<()> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        match self.failures.lock().remove(&op) {
            Some(code) => Err(NativeError::new(op.name(), code)),
            None => Ok(()),
        }
    }

    fn next_handle(&self) -> isize {
        self.next_handle.fetch_add(4, Ordering::Relaxed)
    }

    fn queue_for(&self, thread: ThreadId) -> Arc<ThreadQueue> {
        Arc::clone(self.queues.lock().entry(thread).or_default())
    }

    fn current_queue(&self) -> Arc<ThreadQueue> {
        self.queue_for(thread::current().id())
    }

    fn dispatch(&self, window: WindowHandle, message: WindowMessage) {
        let proc_ = self
            .state
            .lock()
            .windows
            .get(&window)
            .map(|w| Arc::clone(&w.proc_));
        match proc_ {
            Some(proc_) => proc_.handle(window, message),
            None => {
                trace!(window = window.raw(), ?message, "dropping message for destroyed window")
            }
        }
    }

    fn with_menu<T>(
        &self,
        menu: MenuHandle,
        operation: &'static str,
        f: impl FnOnce(&mut Vec<ItemDescriptor>) -> NativeResult<T>,
    ) -> NativeResult<T> {
        let mut state = self.state.lock();
        let items = state
            .menus
            .get_mut(&menu)
            .ok_or(NativeError::new(operation, ERROR_INVALID_MENU_HANDLE))?;
        f(items)
    }
}

fn is_selectable(
    menus: &HashMap<MenuHandle, Vec<ItemDescriptor>>,
    menu: MenuHandle,
    item_id: u32,
) -> bool {
    let Some(items) = menus.get(&menu) else {
        return false;
    };
    items.iter().any(|entry| match entry.item_type {
        NativeItemType::Separator => false,
        NativeItemType::String | NativeItemType::Check { .. } => {
            entry.id == item_id && entry.enabled
        }
        NativeItemType::Submenu(sub) => entry.enabled && is_selectable(menus, sub, item_id),
    })
}

/// Destroys `menu` and, like `DestroyMenu`, every submenu still attached.
fn destroy_recursive(menus: &mut HashMap<MenuHandle, Vec<ItemDescriptor>>, menu: MenuHandle) {
    if let Some(items) = menus.remove(&menu) {
        for entry in items {
            if let NativeItemType::Submenu(sub) = entry.item_type {
                destroy_recursive(menus, sub);
            }
        }
    }
}

impl NativeBackend for HeadlessBackend {
    fn create_window(
        &self,
        kind: WindowKind,
        proc_: Arc<dyn WindowProc>,
    ) -> NativeResult<WindowHandle> {
        self.record(NativeOp::CreateWindow)?;
        let handle = WindowHandle::from_raw(self.next_handle());
        let thread = thread::current().id();
        self.state.lock().windows.insert(
            handle,
            HeadlessWindow {
                kind,
                thread,
                proc_,
            },
        );
        trace!(window = handle.raw(), ?kind, "window created");
        Ok(handle)
    }

    fn destroy_window(&self, window: WindowHandle) -> NativeResult<()> {
        self.record(NativeOp::DestroyWindow)?;
        self.state
            .lock()
            .windows
            .remove(&window)
            .map(|_| ())
            .ok_or(NativeError::new("DestroyWindow", ERROR_INVALID_WINDOW_HANDLE))
    }

    fn post_message(&self, window: WindowHandle, message: WindowMessage) -> NativeResult<()> {
        self.record(NativeOp::PostMessage)?;
        let thread = self
            .state
            .lock()
            .windows
            .get(&window)
            .map(|w| w.thread)
            .ok_or(NativeError::new("PostMessage", ERROR_INVALID_WINDOW_HANDLE))?;
        self.queue_for(thread).push(Queued::Window(window, message));
        Ok(())
    }

    fn run_message_loop(&self) -> NativeResult<()> {
        let queue = self.current_queue();
        loop {
            match queue.pop() {
                Queued::Window(window, message) => self.dispatch(window, message),
                Queued::Select { owner, item_id } => {
                    trace!(owner = owner.raw(), item_id, "ignoring selection outside a popup");
                }
                Queued::Quit => return Ok(()),
            }
        }
    }

    fn quit_message_loop(&self) {
        self.current_queue().push(Queued::Quit);
    }

    fn notify_icon(&self, action: NotifyAction, request: &NotifyRequest) -> NativeResult<()> {
        let op = match action {
            NotifyAction::Add => NativeOp::TrayAdd,
            NotifyAction::Modify => NativeOp::TrayModify,
            NotifyAction::Delete => NativeOp::TrayDelete,
        };
        self.record(op)?;

        let mut state = self.state.lock();
        match action {
            NotifyAction::Add => {
                if state.tray.contains_key(&request.icon_id) {
                    return Err(NativeError::new(op.name(), ERROR_ALREADY_EXISTS));
                }
                state.tray.insert(
                    request.icon_id,
                    TrayEntry {
                        window: request.window,
                        tip: request.tip.clone().unwrap_or_default(),
                        icon: request.icon,
                        callback_message: request.callback_message,
                    },
                );
            }
            NotifyAction::Modify => {
                let entry = state
                    .tray
                    .get_mut(&request.icon_id)
                    .ok_or(NativeError::new(op.name(), ERROR_NOT_FOUND))?;
                if let Some(tip) = &request.tip {
                    entry.tip = tip.clone();
                }
                if request.icon.is_some() {
                    entry.icon = request.icon;
                }
                if request.callback_message.is_some() {
                    entry.callback_message = request.callback_message;
                }
            }
            NotifyAction::Delete => {
                state
                    .tray
                    .remove(&request.icon_id)
                    .ok_or(NativeError::new(op.name(), ERROR_NOT_FOUND))?;
            }
        }
        Ok(())
    }

    fn create_popup_menu(&self) -> NativeResult<MenuHandle> {
        self.record(NativeOp::CreateMenu)?;
        let handle = MenuHandle::from_raw(self.next_handle());
        self.state.lock().menus.insert(handle, Vec::new());
        Ok(handle)
    }

    fn destroy_menu(&self, menu: MenuHandle) -> NativeResult<()> {
        self.record(NativeOp::DestroyMenu)?;
        let mut state = self.state.lock();
        if !state.menus.contains_key(&menu) {
            return Err(NativeError::new("DestroyMenu", ERROR_INVALID_MENU_HANDLE));
        }
        destroy_recursive(&mut state.menus, menu);
        Ok(())
    }

    fn menu_item_count(&self, menu: MenuHandle) -> NativeResult<usize> {
        self.record(NativeOp::ItemCount)?;
        self.with_menu(menu, "GetMenuItemCount", |items| Ok(items.len()))
    }

    fn menu_item_info(&self, menu: MenuHandle, position: usize) -> NativeResult<NativeItemInfo> {
        self.record(NativeOp::ItemInfo)?;
        self.with_menu(menu, "GetMenuItemInfo", |items| {
            items
                .get(position)
                .map(|entry| NativeItemInfo {
                    id: entry.id,
                    synced_counter: entry.synced_counter,
                })
                .ok_or(NativeError::new("GetMenuItemInfo", ERROR_MENU_ITEM_NOT_FOUND))
        })
    }

    fn insert_menu_item(
        &self,
        menu: MenuHandle,
        position: usize,
        item: &ItemDescriptor,
    ) -> NativeResult<()> {
        self.record(NativeOp::InsertItem)?;
        self.with_menu(menu, "InsertMenuItem", |items| {
            // Positions past the end append, as InsertMenuItem does.
            let position = position.min(items.len());
            items.insert(position, item.clone());
            Ok(())
        })
    }

    fn set_menu_item(
        &self,
        menu: MenuHandle,
        position: usize,
        item: &ItemDescriptor,
    ) -> NativeResult<()> {
        self.record(NativeOp::SetItem)?;
        self.with_menu(menu, "SetMenuItemInfo", |items| {
            let entry = items
                .get_mut(position)
                .ok_or(NativeError::new("SetMenuItemInfo", ERROR_MENU_ITEM_NOT_FOUND))?;
            *entry = item.clone();
            Ok(())
        })
    }

    fn remove_menu_item(&self, menu: MenuHandle, position: usize) -> NativeResult<()> {
        self.record(NativeOp::RemoveItem)?;
        self.with_menu(menu, "RemoveMenu", |items| {
            if position >= items.len() {
                return Err(NativeError::new("RemoveMenu", ERROR_MENU_ITEM_NOT_FOUND));
            }
            items.remove(position);
            Ok(())
        })
    }

    fn cursor_position(&self) -> NativeResult<Point> {
        Ok(*self.cursor.lock())
    }

    fn set_foreground_window(&self, window: WindowHandle) -> NativeResult<()> {
        self.record(NativeOp::SetForeground)?;
        if self.state.lock().windows.contains_key(&window) {
            Ok(())
        } else {
            Err(NativeError::new("SetForegroundWindow", ERROR_INVALID_WINDOW_HANDLE))
        }
    }

    fn track_popup_menu(
        &self,
        menu: MenuHandle,
        owner: WindowHandle,
        request: &PopupRequest,
    ) -> NativeResult<Option<u32>> {
        self.record(NativeOp::TrackPopup)?;
        {
            let mut state = self.state.lock();
            if !state.menus.contains_key(&menu) {
                return Err(NativeError::new("TrackPopupMenu", ERROR_INVALID_MENU_HANDLE));
            }
            if !state.windows.contains_key(&owner) {
                return Err(NativeError::new("TrackPopupMenu", ERROR_INVALID_WINDOW_HANDLE));
            }
            if state.tracking.contains_key(&menu) {
                return Err(NativeError::new("TrackPopupMenu", ERROR_GEN_FAILURE));
            }
            state.tracking.insert(menu, owner);
            state.last_popup = Some((menu, *request));
        }

        END_MENU_REQUESTED.with(|flag| flag.set(false));
        self.dispatch(owner, WindowMessage::MenuLoopEntered);

        let queue = self.current_queue();
        let selection = loop {
            match queue.pop() {
                Queued::Select { owner: target, item_id } if target == owner => {
                    break Some(item_id);
                }
                Queued::Select { owner: target, item_id } => {
                    trace!(owner = target.raw(), item_id, "ignoring selection for another popup");
                }
                Queued::Window(window, message) => self.dispatch(window, message),
                Queued::Quit => {
                    // A quit request ends the menu and is re-posted for the outer loop.
                    queue.push(Queued::Quit);
                    break None;
                }
            }
            if END_MENU_REQUESTED.with(Cell::get) {
                break None;
            }
        };
        END_MENU_REQUESTED.with(|flag| flag.set(false));

        self.state.lock().tracking.remove(&menu);
        self.dispatch(owner, WindowMessage::MenuLoopExited);
        Ok(selection)
    }

    fn end_menu(&self) -> NativeResult<()> {
        END_MENU_REQUESTED.with(|flag| flag.set(true));
        Ok(())
    }
}
