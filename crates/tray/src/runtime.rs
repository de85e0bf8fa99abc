//! The runtime owning the backend, registries and loop state.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use traykit_native::{NativeBackend, WindowHandle, platform_backend};
use traykit_registry::IdRegistry;

use crate::config::Config;
use crate::dispatcher::{self, LoopState};
use crate::error::Result;
use crate::event::WaitTimeout;
use crate::icon::{IconInner, TrayIcon};
use crate::menu_item::ItemInner;
use crate::popup::ActivePopups;

pub(crate) struct Shared {
    pub(crate) backend: Arc<dyn NativeBackend>,
    pub(crate) config: Config,
    pub(crate) icons: IdRegistry<u32, Arc<IconInner>>,
    pub(crate) items: IdRegistry<u32, Weak<ItemInner>>,
    pub(crate) popups: ActivePopups,
    pub(crate) dispatcher: LoopState,
    /// Serializes submenu insertion with the cycle check that guards it.
    pub(crate) topology: Mutex<()>,
}

/// Handle to a traykit runtime.
///
/// Cheap to clone; every clone refers to the same registries and loop.
/// Icons, menus and items are created against a runtime and keep it alive.
/// The registries never hold a reference back to the runtime, so it is
/// freed once the last handle is dropped, undestroyed icons included. A
/// callback that captures a `TrayRuntime` keeps it alive as long as the
/// callback is installed.
#[derive(Clone)]
pub struct TrayRuntime {
    shared: Arc<Shared>,
}

impl TrayRuntime {
    /// Creates a runtime on the platform's native backend.
    pub fn new(config: Config) -> Result<Self> {
        let backend = platform_backend(&config.window_class, &config.window_title)?;
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: Config, backend: Arc<dyn NativeBackend>) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                config,
                icons: IdRegistry::auto_increment(),
                items: IdRegistry::auto_increment(),
                popups: ActivePopups::new(),
                dispatcher: LoopState::new(),
                topology: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn backend(&self) -> &Arc<dyn NativeBackend> {
        &self.shared.backend
    }

    /// Runs the tray message loop on the calling thread until [`stop`](Self::stop).
    ///
    /// Only one loop may run per runtime; a second call fails with
    /// [`TrayError::LoopAlreadyRunning`](crate::TrayError::LoopAlreadyRunning)
    /// and leaves the first untouched.
    pub fn run(&self) -> Result<()> {
        dispatcher::run(&self.shared)
    }

    /// Asks the running loop to return. A no-op when no loop is serving.
    pub fn stop(&self) -> Result<()> {
        dispatcher::stop(&self.shared)
    }

    /// Waits until the loop has created its window and shown every visible icon.
    pub fn wait_until_ready(&self, timeout: impl Into<WaitTimeout>) -> bool {
        self.shared.dispatcher.wait_until_ready(timeout.into())
    }

    pub fn is_running(&self) -> bool {
        self.shared.dispatcher.is_running()
    }

    /// The tray message window, while the loop is serving.
    pub fn message_window(&self) -> Option<WindowHandle> {
        self.shared.dispatcher.window()
    }

    /// Looks up a live icon by id.
    pub fn icon(&self, id: u32) -> Option<TrayIcon> {
        let inner = self.shared.icons.get(id)?;
        Some(TrayIcon::from_inner(Arc::clone(&self.shared), inner))
    }

    /// Every live icon, in id order.
    pub fn icons(&self) -> Vec<TrayIcon> {
        self.shared
            .icons
            .snapshot()
            .into_iter()
            .map(|(_, inner)| TrayIcon::from_inner(Arc::clone(&self.shared), inner))
            .collect()
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl fmt::Debug for TrayRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrayRuntime")
            .field("config", &self.shared.config)
            .field("running", &self.is_running())
            .field("icons", &self.shared.icons.len())
            .finish()
    }
}
