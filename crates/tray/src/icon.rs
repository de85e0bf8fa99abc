//! Notification-area icons.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};
use traykit_native::{
    IconHandle, NativeBackend, NotifyAction, NotifyRequest, TRAY_NOTIFY_MESSAGE, WindowHandle,
};

use crate::callback::{CallbackSlot, IconCallback, SLOT_COUNT};
use crate::error::{Result, TrayError};
use crate::runtime::{Shared, TrayRuntime};

/// Icon state held by the registry. It does not point back at the runtime,
/// so an icon never keeps the registry that owns it alive.
pub(crate) struct IconInner {
    id: u32,
    state: Mutex<IconState>,
}

struct IconState {
    tip: String,
    icon: IconHandle,
    hidden: bool,
    /// Window the icon is registered under in the native tray, if any.
    native_window: Option<WindowHandle>,
    destroyed: bool,
    callbacks: [Option<IconCallback>; SLOT_COUNT],
    flags: u16,
}

impl IconState {
    fn ensure_alive(&self, id: u32) -> Result<()> {
        if self.destroyed {
            Err(TrayError::Destroyed(id))
        } else {
            Ok(())
        }
    }

    fn add_request(&self, window: WindowHandle, id: u32) -> NotifyRequest {
        NotifyRequest {
            callback_message: Some(TRAY_NOTIFY_MESSAGE),
            tip: Some(self.tip.clone()),
            icon: Some(self.icon),
            ..NotifyRequest::new(window, id)
        }
    }
}

/// A tray icon.
///
/// The runtime keeps every icon alive until [`destroy`](Self::destroy) is
/// called; clones share one icon. While the message loop is not running,
/// visibility changes are recorded and applied when it starts.
#[derive(Clone)]
pub struct TrayIcon {
    shared: Arc<Shared>,
    inner: Arc<IconInner>,
}

impl TrayIcon {
    /// Creates an icon, showing it right away if the loop is running and
    /// `hidden` is false. `tip` falls back to the configured default.
    pub fn new(
        runtime: &TrayRuntime,
        icon: IconHandle,
        tip: Option<&str>,
        hidden: bool,
    ) -> Result<Self> {
        let shared = runtime.shared();
        let tip = tip.map_or_else(|| shared.config.default_tip.clone(), str::to_string);

        let mut registry = shared.icons.lock();
        let id = registry.allocate_with(|id| {
            Arc::new(IconInner {
                id,
                state: Mutex::new(IconState {
                    tip,
                    icon,
                    hidden,
                    native_window: None,
                    destroyed: false,
                    callbacks: Default::default(),
                    flags: 0,
                }),
            })
        })?;
        let inner = registry
            .get(id)
            .cloned()
            .ok_or_else(|| TrayError::Internal(format!("icon {id} vanished after allocation")))?;

        if !hidden {
            let mut state = inner.state.lock();
            if let Some(window) = shared.dispatcher.window() {
                let request = state.add_request(window, id);
                if let Err(e) = shared.backend.notify_icon(NotifyAction::Add, &request) {
                    drop(state);
                    registry.delete(id)?;
                    return Err(e.into());
                }
                state.native_window = Some(window);
            }
        }
        drop(registry);

        debug!(icon = id, hidden, "tray icon created");
        Ok(Self {
            shared: Arc::clone(shared),
            inner,
        })
    }

    pub(crate) fn from_inner(shared: Arc<Shared>, inner: Arc<IconInner>) -> Self {
        Self { shared, inner }
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn tip(&self) -> String {
        self.inner.state.lock().tip.clone()
    }

    pub fn icon(&self) -> IconHandle {
        self.inner.state.lock().icon
    }

    pub fn is_hidden(&self) -> bool {
        self.inner.state.lock().hidden
    }

    /// Whether the icon is currently registered with the native tray.
    pub fn is_visible(&self) -> bool {
        self.inner.state.lock().native_window.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Bitset of populated callback slots, see [`CallbackSlot::bit`].
    pub fn callback_flags(&self) -> u16 {
        self.inner.state.lock().flags
    }

    pub fn show(&self) -> Result<()> {
        let id = self.inner.id;
        let shared = &self.shared;
        let mut state = self.inner.state.lock();
        state.ensure_alive(id)?;
        if !state.hidden {
            return Ok(());
        }
        if state.native_window.is_none() {
            if let Some(window) = shared.dispatcher.window() {
                let request = state.add_request(window, id);
                shared.backend.notify_icon(NotifyAction::Add, &request)?;
                state.native_window = Some(window);
            }
        }
        state.hidden = false;
        Ok(())
    }

    pub fn hide(&self) -> Result<()> {
        let id = self.inner.id;
        let mut state = self.inner.state.lock();
        state.ensure_alive(id)?;
        if state.hidden {
            return Ok(());
        }
        if let Some(window) = state.native_window {
            self.shared
                .backend
                .notify_icon(NotifyAction::Delete, &NotifyRequest::new(window, id))?;
            state.native_window = None;
        }
        state.hidden = true;
        Ok(())
    }

    /// Replaces the tooltip. The old tip is kept if the native update fails.
    pub fn set_tip(&self, tip: impl Into<String>) -> Result<()> {
        let id = self.inner.id;
        let mut state = self.inner.state.lock();
        state.ensure_alive(id)?;
        let previous = std::mem::replace(&mut state.tip, tip.into());
        if let Some(window) = state.native_window {
            let request = NotifyRequest {
                tip: Some(state.tip.clone()),
                ..NotifyRequest::new(window, id)
            };
            if let Err(e) = self.shared.backend.notify_icon(NotifyAction::Modify, &request) {
                state.tip = previous;
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Replaces the icon image. The old image is kept if the native update fails.
    pub fn set_icon(&self, icon: IconHandle) -> Result<()> {
        let id = self.inner.id;
        let mut state = self.inner.state.lock();
        state.ensure_alive(id)?;
        let previous = std::mem::replace(&mut state.icon, icon);
        if let Some(window) = state.native_window {
            let request = NotifyRequest {
                icon: Some(icon),
                ..NotifyRequest::new(window, id)
            };
            if let Err(e) = self.shared.backend.notify_icon(NotifyAction::Modify, &request) {
                state.icon = previous;
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Installs `callback` for `slot`, replacing any previous one.
    pub fn set_callback(
        &self,
        slot: CallbackSlot,
        callback: impl Fn(&TrayIcon) + Send + Sync + 'static,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.ensure_alive(self.inner.id)?;
        state.callbacks[slot.index()] = Some(Arc::new(callback));
        state.flags |= slot.bit();
        Ok(())
    }

    pub fn clear_callback(&self, slot: CallbackSlot) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.ensure_alive(self.inner.id)?;
        state.callbacks[slot.index()] = None;
        state.flags &= !slot.bit();
        Ok(())
    }

    /// Removes the icon from the tray and releases its id.
    ///
    /// If the native removal fails the icon stays valid. Destroying an
    /// already destroyed icon does nothing.
    pub fn destroy(&self) -> Result<()> {
        let id = self.inner.id;
        let shared = &self.shared;
        let mut registry = shared.icons.lock();
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return Ok(());
        }
        if let Some(window) = state.native_window {
            shared
                .backend
                .notify_icon(NotifyAction::Delete, &NotifyRequest::new(window, id))?;
            state.native_window = None;
        }
        state.callbacks = Default::default();
        state.flags = 0;
        state.destroyed = true;
        drop(state);

        registry.delete(id)?;
        debug!(icon = id, "tray icon destroyed");
        Ok(())
    }
}

impl IconInner {
    /// Registers the icon under the loop's window unless it is hidden or
    /// already registered.
    pub(crate) fn attach(&self, backend: &dyn NativeBackend, window: WindowHandle) -> Result<()> {
        let mut state = self.state.lock();
        if state.destroyed || state.hidden || state.native_window.is_some() {
            return Ok(());
        }
        backend.notify_icon(NotifyAction::Add, &state.add_request(window, self.id))?;
        state.native_window = Some(window);
        Ok(())
    }

    /// Removes the icon from the native tray, logging failures.
    pub(crate) fn detach(&self, backend: &dyn NativeBackend) {
        let mut state = self.state.lock();
        if let Some(window) = state.native_window.take() {
            let request = NotifyRequest::new(window, self.id);
            if let Err(e) = backend.notify_icon(NotifyAction::Delete, &request) {
                warn!(icon = self.id, error = %e, "failed to remove tray icon");
            }
        }
    }
}

/// Runs the callback registered for a native tray event.
pub(crate) fn dispatch_event(shared: &Arc<Shared>, icon_id: u32, event: u32) {
    let Some(slot) = CallbackSlot::from_event(event) else {
        trace!(icon = icon_id, event, "ignoring tray event");
        return;
    };
    let Some(inner) = shared.icons.get(icon_id) else {
        warn!(icon = icon_id, "tray event for unknown icon");
        return;
    };
    let callback = {
        let state = inner.state.lock();
        if state.flags & slot.bit() == 0 {
            return;
        }
        state.callbacks[slot.index()].clone()
    };
    let Some(callback) = callback else {
        return;
    };

    let icon = TrayIcon::from_inner(Arc::clone(shared), inner);
    if catch_unwind(AssertUnwindSafe(|| callback(&icon))).is_err() {
        error!(icon = icon_id, %slot, "tray icon callback panicked");
    }
}

impl PartialEq for TrayIcon {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for TrayIcon {}

impl fmt::Debug for TrayIcon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TrayIcon")
            .field("id", &self.inner.id)
            .field("tip", &state.tip)
            .field("hidden", &state.hidden)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use traykit_native::headless::NativeOp;
    use traykit_native::{WindowMessage, event_code};

    use super::*;
    use crate::testing::{LoopThread, runtime, wait_for};

    const ICON: IconHandle = IconHandle::from_raw(0x77);

    #[test]
    fn icon_created_before_loop_is_shown_on_start() {
        let (rt, backend) = runtime();
        let icon = TrayIcon::new(&rt, ICON, None, false).unwrap();
        assert_eq!(icon.tip(), "traykit");
        assert_eq!(backend.calls(NativeOp::TrayAdd), 0);

        let running = LoopThread::start(&rt);
        let entry = backend.tray_entry(icon.id()).unwrap();
        assert_eq!(entry.tip, "traykit");
        assert_eq!(entry.icon, Some(ICON));
        assert_eq!(entry.callback_message, Some(TRAY_NOTIFY_MESSAGE));
        assert_eq!(Some(entry.window), rt.message_window());
        assert!(icon.is_visible());

        running.stop();
        assert!(backend.tray_entry(icon.id()).is_none());
        assert!(!icon.is_visible());
        assert!(!icon.is_hidden());
    }

    #[test]
    fn hidden_icon_is_added_once_on_show() {
        let (rt, backend) = runtime();
        let icon = TrayIcon::new(&rt, ICON, Some("hello"), true).unwrap();

        // Replay on start skips the hidden icon.
        let running = LoopThread::start(&rt);
        assert_eq!(backend.calls(NativeOp::TrayAdd), 0);
        assert!(backend.tray_entry(icon.id()).is_none());

        icon.show().unwrap();
        icon.show().unwrap();
        assert_eq!(backend.calls(NativeOp::TrayAdd), 1);
        assert_eq!(backend.tray_entry(icon.id()).unwrap().tip, "hello");

        icon.hide().unwrap();
        icon.hide().unwrap();
        assert_eq!(backend.calls(NativeOp::TrayDelete), 1);
        assert!(backend.tray_entry(icon.id()).is_none());

        running.stop();
    }

    #[test]
    fn visibility_changes_without_loop_touch_nothing_native() {
        let (rt, backend) = runtime();
        let icon = TrayIcon::new(&rt, ICON, None, false).unwrap();
        icon.hide().unwrap();
        icon.show().unwrap();
        icon.set_tip("offline").unwrap();

        assert_eq!(backend.calls(NativeOp::TrayAdd), 0);
        assert_eq!(backend.calls(NativeOp::TrayDelete), 0);
        assert_eq!(backend.calls(NativeOp::TrayModify), 0);
        assert_eq!(icon.tip(), "offline");
    }

    #[test]
    fn failed_add_releases_the_id() {
        let (rt, backend) = runtime();
        let running = LoopThread::start(&rt);

        backend.fail_next(NativeOp::TrayAdd, 5);
        let err = TrayIcon::new(&rt, ICON, None, false).unwrap_err();
        assert!(matches!(err, TrayError::Native(ref e) if e.code == 5));
        assert!(rt.icons().is_empty());

        running.stop();
    }

    #[test]
    fn tip_is_restored_when_modify_fails() {
        let (rt, backend) = runtime();
        let running = LoopThread::start(&rt);
        let icon = TrayIcon::new(&rt, ICON, Some("before"), false).unwrap();

        backend.fail_next(NativeOp::TrayModify, 5);
        assert!(icon.set_tip("after").is_err());
        assert_eq!(icon.tip(), "before");
        assert_eq!(backend.tray_entry(icon.id()).unwrap().tip, "before");

        icon.set_tip("after").unwrap();
        assert_eq!(backend.tray_entry(icon.id()).unwrap().tip, "after");

        let other = IconHandle::from_raw(0x88);
        backend.fail_next(NativeOp::TrayModify, 5);
        assert!(icon.set_icon(other).is_err());
        assert_eq!(icon.icon(), ICON);

        running.stop();
    }

    #[test]
    fn destroy_is_idempotent_and_final() {
        let (rt, backend) = runtime();
        let running = LoopThread::start(&rt);
        let icon = TrayIcon::new(&rt, ICON, None, false).unwrap();
        icon.set_callback(CallbackSlot::MouseMove, |_| {}).unwrap();

        backend.fail_next(NativeOp::TrayDelete, 5);
        assert!(icon.destroy().is_err());
        assert!(!icon.is_destroyed());
        assert!(rt.icon(icon.id()).is_some());

        icon.destroy().unwrap();
        icon.destroy().unwrap();
        assert!(icon.is_destroyed());
        assert_eq!(icon.callback_flags(), 0);
        assert!(rt.icon(icon.id()).is_none());
        assert!(backend.tray_entry(icon.id()).is_none());
        assert!(matches!(icon.show(), Err(TrayError::Destroyed(id)) if id == icon.id()));

        running.stop();
    }

    #[test]
    fn runtime_with_undestroyed_icons_is_freed() {
        let (rt, backend) = runtime();
        let icon = TrayIcon::new(&rt, ICON, None, false).unwrap();
        icon.set_callback(CallbackSlot::LeftButtonUp, |_| {}).unwrap();
        let found = rt.icon(icon.id()).unwrap();
        assert_eq!(found, icon);
        assert!(Arc::strong_count(&backend) > 1);

        drop((icon, found, rt));
        assert_eq!(Arc::strong_count(&backend), 1);
    }

    #[test]
    fn callback_flags_follow_slots() {
        let (rt, _backend) = runtime();
        let icon = TrayIcon::new(&rt, ICON, None, false).unwrap();
        icon.set_callback(CallbackSlot::LeftButtonUp, |_| {}).unwrap();
        icon.set_callback(CallbackSlot::NotificationClick, |_| {}).unwrap();
        assert_eq!(
            icon.callback_flags(),
            CallbackSlot::LeftButtonUp.bit() | CallbackSlot::NotificationClick.bit()
        );

        icon.clear_callback(CallbackSlot::LeftButtonUp).unwrap();
        assert_eq!(icon.callback_flags(), CallbackSlot::NotificationClick.bit());
    }

    #[test]
    fn tray_events_reach_the_matching_slot() {
        let (rt, backend) = runtime();
        let running = LoopThread::start(&rt);
        let icon = TrayIcon::new(&rt, ICON, None, false).unwrap();

        let clicks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&clicks);
        let expected = icon.id();
        icon.set_callback(CallbackSlot::LeftButtonUp, move |icon| {
            assert_eq!(icon.id(), expected);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let window = rt.message_window().unwrap();
        for event in [event_code::LBUTTON_DOWN, event_code::LBUTTON_UP] {
            backend
                .post_message(window, WindowMessage::TrayNotify { icon_id: icon.id(), event })
                .unwrap();
        }
        assert!(wait_for(|| clicks.load(Ordering::SeqCst) == 1));

        running.stop();
    }
}
