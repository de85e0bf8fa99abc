//! Bookkeeping for menus currently shown, and the popup owner window.

use std::sync::Weak;

use tracing::{error, trace, warn};
use traykit_native::{NativeBackend, WindowHandle, WindowMessage, WindowProc};
use traykit_registry::IdRegistry;

use crate::error::Result;
use crate::menu::{Menu, MenuInner};
use crate::menu_item::MenuItem;
use crate::sync;

/// Menus currently tracked, keyed by their owner window.
pub(crate) struct ActivePopups {
    registry: IdRegistry<isize, Menu>,
}

impl ActivePopups {
    pub(crate) fn new() -> Self {
        Self {
            registry: IdRegistry::explicit_keys(),
        }
    }

    pub(crate) fn register(&self, owner: WindowHandle, menu: Menu) -> Result<()> {
        self.registry.put(owner.raw(), menu)?;
        Ok(())
    }

    pub(crate) fn unregister(&self, owner: WindowHandle) -> Result<Menu> {
        Ok(self.registry.delete(owner.raw())?)
    }

    /// Posts an update for `item` to every popup whose tree contains it.
    pub(crate) fn notify_item_changed(&self, backend: &dyn NativeBackend, item: &MenuItem) {
        let registry = self.registry.lock();
        for (owner, menu) in registry.iter() {
            if !menu.contains(item) {
                continue;
            }
            let window = WindowHandle::from_raw(owner);
            let message = WindowMessage::ItemUpdate { item_id: item.id() };
            if let Err(e) = backend.post_message(window, message) {
                warn!(
                    window = owner,
                    item = item.id(),
                    error = %e,
                    "failed to post menu item update"
                );
            }
        }
    }
}

/// Message handler of a popup's owner window.
///
/// Runs on the thread tracking the popup, which is the only thread allowed
/// to touch the menu while it is shown.
pub(crate) struct PopupWindowProc {
    menu: Weak<MenuInner>,
}

impl PopupWindowProc {
    pub(crate) fn new(menu: Weak<MenuInner>) -> Self {
        Self { menu }
    }
}

impl WindowProc for PopupWindowProc {
    fn handle(&self, window: WindowHandle, message: WindowMessage) {
        let Some(menu) = self.menu.upgrade().map(Menu::from_inner) else {
            return;
        };
        let shared = &menu.inner.shared;
        match message {
            WindowMessage::ItemUpdate { item_id } => {
                let Some(item) = MenuItem::lookup(shared, item_id) else {
                    trace!(item = item_id, "updated item no longer exists");
                    return;
                };
                if let Err(e) = sync::update_item_in_tree(shared.backend.as_ref(), &menu, &item) {
                    error!(
                        window = window.raw(),
                        item = item_id,
                        error = %e,
                        "failed to update shown menu item"
                    );
                }
            }
            WindowMessage::MenuLoopEntered => menu.inner.popup_active.set(),
            WindowMessage::MenuLoopExited => menu.inner.popup_active.reset(),
            WindowMessage::ClosePopup => {
                if let Err(e) = shared.backend.end_menu() {
                    warn!(window = window.raw(), error = %e, "failed to end popup menu");
                }
            }
            WindowMessage::TrayNotify { .. } | WindowMessage::EndLoop => {
                trace!(window = window.raw(), ?message, "ignoring message on popup owner");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use traykit_native::headless::NativeOp;

    use super::*;
    use crate::testing::runtime;

    #[test]
    fn register_is_exclusive_per_window() {
        let (rt, _backend) = runtime();
        let popups = ActivePopups::new();
        let menu = Menu::empty(&rt).unwrap();
        let window = WindowHandle::from_raw(0x40);

        popups.register(window, menu.clone()).unwrap();
        assert!(popups.register(window, menu.clone()).is_err());
        assert_eq!(popups.unregister(window).unwrap(), menu);
        assert!(popups.unregister(window).is_err());
        assert!(popups.registry.is_empty());
    }

    #[test]
    fn changes_are_posted_only_to_menus_holding_the_item() {
        let (rt, backend) = runtime();
        let shared_item = MenuItem::string(&rt, "shared").unwrap();
        let other = MenuItem::string(&rt, "other").unwrap();
        let child = Menu::new(&rt, [shared_item.clone()]).unwrap();
        let with_item = Menu::new(&rt, [MenuItem::submenu(&rt, "sub", &child).unwrap()]).unwrap();
        let without_item = Menu::new(&rt, [other]).unwrap();

        let popups = ActivePopups::new();
        let proc_ = |menu: &Menu| -> Arc<dyn WindowProc> {
            Arc::new(PopupWindowProc::new(menu.downgrade()))
        };
        let first = backend
            .create_window(traykit_native::WindowKind::PopupOwner, proc_(&with_item))
            .unwrap();
        let second = backend
            .create_window(traykit_native::WindowKind::PopupOwner, proc_(&without_item))
            .unwrap();
        popups.register(first, with_item).unwrap();
        popups.register(second, without_item).unwrap();

        backend.reset_calls();
        popups.notify_item_changed(backend.as_ref(), &shared_item);
        assert_eq!(backend.calls(NativeOp::PostMessage), 1);
    }
}
