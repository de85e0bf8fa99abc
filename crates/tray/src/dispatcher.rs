//! The tray message loop.
//!
//! One thread at a time runs the loop. It owns the tray message window,
//! replays every visible icon into the native tray on start, dispatches
//! tray notifications to icon callbacks and removes the icons again on exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{info, trace, warn};
use traykit_native::{WindowHandle, WindowKind, WindowMessage, WindowProc};

use crate::error::{Result, TrayError};
use crate::event::{Event, WaitTimeout};
use crate::icon;
use crate::runtime::Shared;

pub(crate) struct LoopState {
    running: AtomicBool,
    /// Published once the message window exists.
    window: Mutex<Option<WindowHandle>>,
    ready: Event,
}

impl LoopState {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            window: Mutex::new(None),
            ready: Event::default(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The message window, while the loop is serving.
    pub(crate) fn window(&self) -> Option<WindowHandle> {
        *self.window.lock()
    }

    pub(crate) fn wait_until_ready(&self, timeout: WaitTimeout) -> bool {
        self.ready.wait(timeout)
    }
}

/// Clears the running flag when the loop exits, however it exits.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) fn run(shared: &Arc<Shared>) -> Result<()> {
    let state = &shared.dispatcher;
    if state
        .running
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(TrayError::LoopAlreadyRunning);
    }
    let _running = RunningGuard(&state.running);

    let window = shared.backend.create_window(
        WindowKind::Message,
        Arc::new(MessageWindowProc {
            shared: Arc::downgrade(shared),
        }),
    )?;
    let result = serve(shared, window);
    teardown(shared, window);
    result
}

fn serve(shared: &Shared, window: WindowHandle) -> Result<()> {
    *shared.dispatcher.window.lock() = Some(window);
    {
        let icons = shared.icons.lock();
        for (_, icon) in icons.iter() {
            icon.attach(shared.backend.as_ref(), window)?;
        }
    }
    shared.dispatcher.ready.set();
    info!(window = window.raw(), icons = shared.icons.len(), "tray message loop started");

    shared.backend.run_message_loop()?;
    Ok(())
}

fn teardown(shared: &Shared, window: WindowHandle) {
    shared.dispatcher.ready.reset();
    shared.dispatcher.window.lock().take();
    {
        let icons = shared.icons.lock();
        for (_, icon) in icons.iter() {
            icon.detach(shared.backend.as_ref());
        }
    }
    if let Err(e) = shared.backend.destroy_window(window) {
        warn!(window = window.raw(), error = %e, "failed to destroy tray message window");
    }
    info!("tray message loop stopped");
}

/// Asks the loop to exit. Returns immediately.
pub(crate) fn stop(shared: &Shared) -> Result<()> {
    match shared.dispatcher.window() {
        Some(window) => {
            shared.backend.post_message(window, WindowMessage::EndLoop)?;
            Ok(())
        }
        None => {
            trace!("stop requested while no loop is serving");
            Ok(())
        }
    }
}

struct MessageWindowProc {
    shared: Weak<Shared>,
}

impl WindowProc for MessageWindowProc {
    fn handle(&self, window: WindowHandle, message: WindowMessage) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match message {
            WindowMessage::TrayNotify { icon_id, event } => {
                icon::dispatch_event(&shared, icon_id, event);
            }
            WindowMessage::EndLoop => shared.backend.quit_message_loop(),
            other => {
                trace!(window = window.raw(), message = ?other, "ignoring message on tray window")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use traykit_native::event_code;
    use traykit_native::headless::NativeOp;
    use traykit_native::{IconHandle, NativeBackend, Point};

    use super::*;
    use crate::callback::CallbackSlot;
    use crate::icon::TrayIcon;
    use crate::menu::{Menu, PopupOptions};
    use crate::menu_item::MenuItem;
    use crate::testing::{LoopThread, runtime, wait_for};

    #[test]
    fn second_loop_is_rejected_without_disturbing_the_first() {
        let (rt, backend) = runtime();
        let running = LoopThread::start(&rt);
        let window = rt.message_window().unwrap();

        assert!(matches!(rt.run(), Err(TrayError::LoopAlreadyRunning)));
        assert!(rt.is_running());
        assert_eq!(rt.message_window(), Some(window));
        assert_eq!(backend.calls(NativeOp::CreateWindow), 1);

        running.stop();
        assert!(!rt.is_running());
        assert_eq!(rt.message_window(), None);
        assert!(backend.windows(WindowKind::Message).is_empty());
        assert!(!rt.wait_until_ready(-1.0));
    }

    #[test]
    fn loop_can_restart_and_replays_icons() {
        let (rt, backend) = runtime();
        let icon = TrayIcon::new(&rt, IconHandle::from_raw(1), None, false).unwrap();
        let hidden = TrayIcon::new(&rt, IconHandle::from_raw(2), None, true).unwrap();

        for _ in 0..2 {
            let running = LoopThread::start(&rt);
            assert!(backend.tray_entry(icon.id()).is_some());
            assert!(backend.tray_entry(hidden.id()).is_none());
            running.stop();
            assert!(backend.tray_entries().is_empty());
        }
        assert_eq!(backend.calls(NativeOp::TrayAdd), 2);
    }

    #[test]
    fn failed_replay_tears_down() {
        let (rt, backend) = runtime();
        TrayIcon::new(&rt, IconHandle::from_raw(1), None, false).unwrap();
        backend.fail_next(NativeOp::TrayAdd, 5);

        assert!(matches!(rt.run(), Err(TrayError::Native(_))));
        assert!(!rt.is_running());
        assert!(backend.windows(WindowKind::Message).is_empty());
    }

    #[test]
    fn stop_without_loop_is_a_no_op() {
        let (rt, _backend) = runtime();
        rt.stop().unwrap();
        assert!(!rt.is_running());
    }

    #[test]
    fn panicking_callback_does_not_stop_the_loop() {
        let (rt, backend) = runtime();
        let running = LoopThread::start(&rt);
        let icon = TrayIcon::new(&rt, IconHandle::from_raw(1), None, false).unwrap();
        icon.set_callback(CallbackSlot::MouseMove, |_| panic!("boom"))
            .unwrap();
        let (tx, rx) = mpsc::channel();
        icon.set_callback(CallbackSlot::RightButtonUp, move |icon| {
            tx.send(icon.id()).unwrap();
        })
        .unwrap();

        let window = rt.message_window().unwrap();
        for event in [event_code::MOUSE_MOVE, event_code::RBUTTON_UP] {
            backend
                .post_message(window, WindowMessage::TrayNotify { icon_id: icon.id(), event })
                .unwrap();
        }
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(icon.id()));
        assert!(rt.is_running());

        running.stop();
    }

    #[test]
    fn events_for_unknown_icons_are_ignored() {
        let (rt, backend) = runtime();
        let running = LoopThread::start(&rt);
        let window = rt.message_window().unwrap();
        backend
            .post_message(
                window,
                WindowMessage::TrayNotify { icon_id: 99, event: event_code::LBUTTON_UP },
            )
            .unwrap();
        running.stop();
    }

    #[test]
    fn icon_callback_can_show_a_menu() {
        let (rt, backend) = runtime();
        let running = LoopThread::start(&rt);
        let quit = MenuItem::string(&rt, "Quit").unwrap();
        let stopper = rt.clone();
        quit.set_callback(move |_| stopper.stop().unwrap()).unwrap();
        let menu = Menu::new(&rt, [quit.clone()]).unwrap();

        let icon = TrayIcon::new(&rt, IconHandle::from_raw(1), None, false).unwrap();
        let (tx, rx) = mpsc::channel();
        let popup_menu = menu.clone();
        icon.set_callback(CallbackSlot::RightButtonUp, move |_| {
            let selected = popup_menu.popup(&PopupOptions::default().at(Point { x: 5, y: 5 }));
            tx.send(selected.map(|item| item.map(|item| item.id())).ok()).unwrap();
        })
        .unwrap();

        let window = rt.message_window().unwrap();
        backend
            .post_message(
                window,
                WindowMessage::TrayNotify { icon_id: icon.id(), event: event_code::RBUTTON_UP },
            )
            .unwrap();
        assert!(menu.wait_for_popup(5.0));
        backend.select_popup_item(menu.native_handle(), quit.id()).unwrap();

        let selected = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(selected, Some(Some(quit.id())));
        // The Quit callback stopped the loop from inside the dispatcher thread.
        assert!(wait_for(|| !rt.is_running()));
        drop(running);
    }
}
