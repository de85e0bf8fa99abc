//! Popup menus.
//!
//! A [`Menu`] owns a native popup menu and an ordered list of items whose
//! positions match the native entries. Structural changes (insert, remove)
//! apply to both at once; item property changes are synced lazily, right
//! before a popup is shown or, while one is showing, on the thread that
//! tracks it.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};
use traykit_native::{
    HorizontalAlign, MenuHandle, Point, PopupRequest, VerticalAlign, WindowHandle, WindowKind,
    WindowMessage,
};

use crate::config::Config;
use crate::error::{Result, TrayError};
use crate::event::{Event, WaitTimeout};
use crate::menu_item::MenuItem;
use crate::popup::PopupWindowProc;
use crate::runtime::{Shared, TrayRuntime};
use crate::sync;

/// Placement of a popup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopupOptions {
    /// Anchor point in screen coordinates; the cursor position when `None`.
    pub position: Option<Point>,
    pub horizontal: HorizontalAlign,
    pub vertical: VerticalAlign,
    pub allow_right_click: bool,
}

impl PopupOptions {
    /// Options seeded from the `[popup]` configuration table.
    pub fn from_config(config: &Config) -> Self {
        Self {
            position: None,
            horizontal: config.popup.horizontal_align,
            vertical: config.popup.vertical_align,
            allow_right_click: config.popup.allow_right_click,
        }
    }

    pub fn at(self, position: Point) -> Self {
        Self {
            position: Some(position),
            ..self
        }
    }
}

pub(crate) struct MenuInner {
    pub(crate) shared: Arc<Shared>,
    handle: MenuHandle,
    pub(crate) items: Mutex<Vec<MenuItem>>,
    /// Owner window of the popup being shown, if any.
    owner: Mutex<Option<WindowHandle>>,
    pub(crate) popup_active: Event,
    popup_guard: Mutex<()>,
}

impl Drop for MenuInner {
    fn drop(&mut self) {
        let backend = &self.shared.backend;
        // Detach entries first so nested submenus outlive this menu.
        match backend.menu_item_count(self.handle) {
            Ok(count) => {
                for position in (0..count).rev() {
                    if let Err(e) = backend.remove_menu_item(self.handle, position) {
                        warn!(
                            menu = self.handle.raw(),
                            position,
                            error = %e,
                            "failed to remove menu entry"
                        );
                    }
                }
            }
            Err(e) => warn!(menu = self.handle.raw(), error = %e, "failed to count menu entries"),
        }
        if let Err(e) = backend.destroy_menu(self.handle) {
            warn!(menu = self.handle.raw(), error = %e, "failed to destroy menu");
        }
    }
}

/// A popup menu. Clones share one menu.
#[derive(Clone)]
pub struct Menu {
    pub(crate) inner: Arc<MenuInner>,
}

impl Menu {
    /// Creates a menu holding `items` in order.
    pub fn new(runtime: &TrayRuntime, items: impl IntoIterator<Item = MenuItem>) -> Result<Self> {
        let shared = runtime.shared();
        let items: Vec<MenuItem> = items.into_iter().collect();
        let handle = shared.backend.create_popup_menu()?;
        let menu = Self {
            inner: Arc::new(MenuInner {
                shared: Arc::clone(shared),
                handle,
                items: Mutex::new(Vec::new()),
                owner: Mutex::new(None),
                popup_active: Event::default(),
                popup_guard: Mutex::new(()),
            }),
        };

        {
            let mut current = menu.inner.items.lock();
            sync::insert_all(shared.backend.as_ref(), handle, &items)?;
            *current = items;
        }
        debug!(menu = handle.raw(), items = menu.len(), "menu created");
        Ok(menu)
    }

    pub fn empty(runtime: &TrayRuntime) -> Result<Self> {
        Self::new(runtime, Vec::new())
    }

    pub(crate) fn from_inner(inner: Arc<MenuInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<MenuInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn native_handle(&self) -> MenuHandle {
        self.inner.handle
    }

    /// The items in display order.
    pub fn as_list(&self) -> Vec<MenuItem> {
        self.inner.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts `item` before position `index`.
    ///
    /// Negative indices count from the end; out-of-range indices are clamped.
    pub fn insert_item(&self, index: isize, item: MenuItem) -> Result<()> {
        let shared = &self.inner.shared;
        let _topology = match item.child_menu() {
            Some(submenu) => {
                let guard = shared.topology.lock();
                if submenu == *self || submenu.contains_menu(self) {
                    return Err(TrayError::CircularReference);
                }
                Some(guard)
            }
            None => None,
        };

        let mut items = self.inner.items.lock();
        let position = insert_position(index, items.len());
        items.insert(position, item.clone());
        let backend = shared.backend.as_ref();
        if let Err(e) = sync::insert_item(backend, self.inner.handle, position, &item) {
            items.remove(position);
            return Err(e);
        }
        debug!(menu = self.inner.handle.raw(), item = item.id(), position, "menu item inserted");
        Ok(())
    }

    pub fn append_item(&self, item: MenuItem) -> Result<()> {
        self.insert_item(isize::MAX, item)
    }

    /// Removes and returns the item at `index`. Negative indices count from the end.
    pub fn remove_item(&self, index: isize) -> Result<MenuItem> {
        let backend = self.inner.shared.backend.as_ref();
        let mut items = self.inner.items.lock();
        let len = items.len();
        let position =
            existing_position(index, len).ok_or(TrayError::IndexOutOfRange { index, len })?;

        let expected = items[position].id();
        let native = backend.menu_item_info(self.inner.handle, position)?;
        if native.id != expected {
            return Err(TrayError::Internal(format!(
                "menu item id doesn't match: expected {expected}, native menu has {}",
                native.id
            )));
        }
        backend.remove_menu_item(self.inner.handle, position)?;
        let item = items.remove(position);
        debug!(menu = self.inner.handle.raw(), item = expected, position, "menu item removed");
        Ok(item)
    }

    /// Whether `item` appears in this menu or any submenu below it.
    pub fn contains(&self, item: &MenuItem) -> bool {
        let submenus: Vec<Menu> = {
            let items = self.inner.items.lock();
            if items.iter().any(|entry| entry == item) {
                return true;
            }
            items.iter().filter_map(MenuItem::child_menu).collect()
        };
        submenus.iter().any(|submenu| submenu.contains(item))
    }

    /// Whether `target` is reachable through this menu's submenus.
    ///
    /// Locks one menu at a time and never locks `target`.
    fn contains_menu(&self, target: &Menu) -> bool {
        let submenus: Vec<Menu> = self
            .inner
            .items
            .lock()
            .iter()
            .filter_map(MenuItem::child_menu)
            .collect();
        submenus
            .iter()
            .any(|submenu| submenu == target || submenu.contains_menu(target))
    }

    /// Shows the menu and blocks until it is dismissed.
    ///
    /// Returns the selected item after running its callback, or `None` when
    /// the menu was dismissed or closed. Items changed while the menu is open
    /// are updated in place.
    pub fn popup(&self, options: &PopupOptions) -> Result<Option<MenuItem>> {
        let shared = &self.inner.shared;
        let backend = shared.backend.as_ref();
        let guard = self
            .inner
            .popup_guard
            .try_lock()
            .ok_or(TrayError::PopupInProgress)?;

        let position = match options.position {
            Some(position) => position,
            None => backend.cursor_position()?,
        };
        let request = PopupRequest {
            position,
            horizontal: options.horizontal,
            vertical: options.vertical,
            allow_right_click: options.allow_right_click,
        };

        let owner = backend.create_window(
            WindowKind::PopupOwner,
            Arc::new(PopupWindowProc::new(self.downgrade())),
        )?;
        let result = self.track(owner, &request);
        if let Err(e) = backend.destroy_window(owner) {
            warn!(window = owner.raw(), error = %e, "failed to destroy popup owner window");
        }
        drop(guard);

        let Some(item_id) = result? else {
            debug!(menu = self.inner.handle.raw(), "popup dismissed");
            return Ok(None);
        };
        let Some(item) = MenuItem::lookup(shared, item_id) else {
            warn!(item = item_id, "selected menu item no longer exists");
            return Ok(None);
        };
        debug!(menu = self.inner.handle.raw(), item = item_id, "menu item selected");
        item.invoke_callback();
        Ok(Some(item))
    }

    /// Registers the popup, syncs the tree and runs the blocking track call.
    fn track(&self, owner: WindowHandle, request: &PopupRequest) -> Result<Option<u32>> {
        let shared = &self.inner.shared;
        let backend = shared.backend.as_ref();

        // Register before syncing so no concurrent change falls between the two.
        shared.popups.register(owner, self.clone())?;
        *self.inner.owner.lock() = Some(owner);

        let result = sync::update_menu(backend, self).and_then(|()| {
            if let Err(e) = backend.set_foreground_window(owner) {
                debug!(
                    window = owner.raw(),
                    error = %e,
                    "could not bring popup owner to the foreground"
                );
            }
            Ok(backend.track_popup_menu(self.inner.handle, owner, request)?)
        });

        *self.inner.owner.lock() = None;
        self.inner.popup_active.reset();
        if let Err(e) = shared.popups.unregister(owner) {
            warn!(window = owner.raw(), error = %e, "failed to unregister popup");
        }
        result
    }

    /// Asks the popup currently showing this menu to close. A no-op when
    /// the menu is not shown.
    pub fn close(&self) {
        let owner = *self.inner.owner.lock();
        if let Some(owner) = owner {
            if let Err(e) = self
                .inner
                .shared
                .backend
                .post_message(owner, WindowMessage::ClosePopup)
            {
                warn!(window = owner.raw(), error = %e, "failed to post popup close request");
            }
        }
    }

    /// Waits until the menu is showing. See [`WaitTimeout`] for the
    /// meaning of numeric timeouts.
    pub fn wait_for_popup(&self, timeout: impl Into<WaitTimeout>) -> bool {
        self.inner.popup_active.wait(timeout.into())
    }

    pub fn is_popup_active(&self) -> bool {
        self.inner.popup_active.is_set()
    }
}

fn insert_position(index: isize, len: usize) -> usize {
    let len = len as isize;
    let position = if index < 0 { index.saturating_add(len) } else { index };
    position.clamp(0, len) as usize
}

fn existing_position(index: isize, len: usize) -> Option<usize> {
    let position = if index < 0 {
        index.checked_add(len as isize)?
    } else {
        index
    };
    usize::try_from(position).ok().filter(|&position| position < len)
}

impl PartialEq for Menu {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Menu {}

impl fmt::Debug for Menu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Menu")
            .field("handle", &self.inner.handle)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use traykit_native::headless::NativeOp;
    use traykit_native::{NativeBackend, NativeItemType};

    use super::*;
    use crate::testing::{runtime, wait_for};

    fn ids(items: &[MenuItem]) -> Vec<u32> {
        items.iter().map(MenuItem::id).collect()
    }

    fn native_ids(backend: &traykit_native::HeadlessBackend, menu: &Menu) -> Vec<u32> {
        backend
            .menu_items(menu.native_handle())
            .unwrap()
            .iter()
            .map(|entry| entry.id)
            .collect()
    }

    #[test]
    fn positions_follow_list_semantics() {
        assert_eq!(insert_position(0, 3), 0);
        assert_eq!(insert_position(-1, 3), 2);
        assert_eq!(insert_position(-10, 3), 0);
        assert_eq!(insert_position(isize::MAX, 3), 3);
        assert_eq!(existing_position(-1, 3), Some(2));
        assert_eq!(existing_position(-4, 3), None);
        assert_eq!(existing_position(3, 3), None);
        assert_eq!(existing_position(isize::MIN, 3), None);
    }

    #[test]
    fn declared_items_are_pushed_to_native_menu() {
        let (rt, backend) = runtime();
        let separator = MenuItem::separator(&rt).unwrap();
        let a = MenuItem::string(&rt, "A").unwrap();
        let b = MenuItem::check(&rt, "B", true).unwrap();
        let menu = Menu::new(&rt, [separator.clone(), a.clone(), b.clone()]).unwrap();

        assert_eq!(menu.as_list(), vec![separator, a.clone(), b.clone()]);
        let entries = backend.menu_items(menu.native_handle()).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].item_type, NativeItemType::Separator);
        assert_eq!(entries[0].label, None);
        assert_eq!(entries[1].item_type, NativeItemType::String);
        assert_eq!(entries[1].label.as_deref(), Some("A"));
        assert_eq!(entries[1].id, a.id());
        assert_eq!(entries[2].item_type, NativeItemType::Check { radio: false });
        assert!(entries[2].checked);
        assert_eq!(entries[2].id, b.id());
    }

    #[test]
    fn check_toggle_bumps_counter_once_and_syncs_on_popup() {
        let (rt, backend) = runtime();
        let separator = MenuItem::separator(&rt).unwrap();
        let a = MenuItem::string(&rt, "A").unwrap();
        let b = MenuItem::check(&rt, "B", false).unwrap();
        let menu = Menu::new(&rt, [separator, a, b.clone()]).unwrap();
        let handle = menu.native_handle();
        assert_eq!(menu.len(), 3);
        assert!(!backend.menu_items(handle).unwrap()[2].checked);

        let before = b.update_counter();
        b.set_checked(true).unwrap();
        assert_eq!(b.update_counter(), before + 1);
        assert!(!backend.menu_items(handle).unwrap()[2].checked);

        let popup_menu = menu.clone();
        let popup_thread = thread::spawn(move || popup_menu.popup(&PopupOptions::default()));
        assert!(menu.wait_for_popup(5.0));
        let entry = &backend.menu_items(handle).unwrap()[2];
        assert!(entry.checked);
        assert_eq!(entry.synced_counter, before + 1);
        menu.close();
        assert_eq!(popup_thread.join().unwrap().unwrap(), None);
    }

    #[test]
    fn insert_append_remove_keep_native_in_step() {
        let (rt, backend) = runtime();
        let items: Vec<MenuItem> = ["item1", "item2", "item3"]
            .into_iter()
            .map(|label| MenuItem::string(&rt, label).unwrap())
            .collect();
        let menu = Menu::new(&rt, items.clone()).unwrap();
        let item4 = MenuItem::string(&rt, "item4").unwrap();
        let item5 = MenuItem::string(&rt, "item5").unwrap();

        menu.insert_item(0, item4.clone()).unwrap();
        menu.append_item(item5.clone()).unwrap();
        let removed = menu.remove_item(1).unwrap();

        assert_eq!(removed, items[0]);
        let expected = vec![item4, items[1].clone(), items[2].clone(), item5];
        assert_eq!(menu.as_list(), expected);
        assert_eq!(native_ids(&backend, &menu), ids(&expected));
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let (rt, backend) = runtime();
        let items: Vec<MenuItem> = ["item1", "item2", "item3"]
            .into_iter()
            .map(|label| MenuItem::string(&rt, label).unwrap())
            .collect();
        let menu = Menu::new(&rt, items.clone()).unwrap();
        let item4 = MenuItem::string(&rt, "item4").unwrap();

        menu.remove_item(-2).unwrap();
        menu.insert_item(-1, item4.clone()).unwrap();

        let expected = vec![items[0].clone(), item4, items[2].clone()];
        assert_eq!(menu.as_list(), expected);
        assert_eq!(native_ids(&backend, &menu), ids(&expected));
    }

    #[test]
    fn remove_out_of_range_fails() {
        let (rt, _backend) = runtime();
        let menu = Menu::new(&rt, [MenuItem::string(&rt, "only").unwrap()]).unwrap();
        assert!(matches!(
            menu.remove_item(1),
            Err(TrayError::IndexOutOfRange { index: 1, len: 1 })
        ));
        assert!(matches!(
            menu.remove_item(-2),
            Err(TrayError::IndexOutOfRange { index: -2, len: 1 })
        ));
        assert_eq!(menu.len(), 1);
    }

    #[test]
    fn remove_with_mismatched_native_entry_changes_nothing() {
        let (rt, backend) = runtime();
        let x = MenuItem::string(&rt, "x").unwrap();
        let y = MenuItem::string(&rt, "y").unwrap();
        let menu = Menu::new(&rt, [x.clone(), y.clone()]).unwrap();
        let handle = menu.native_handle();
        backend.remove_menu_item(handle, 0).unwrap();
        let foreign = y.descriptor().0;
        backend.insert_menu_item(handle, 0, &foreign).unwrap();
        let before = backend.menu_items(handle).unwrap();

        let err = menu.remove_item(0).unwrap_err();
        assert!(
            matches!(&err, TrayError::Internal(message) if message.contains("doesn't match")),
            "{err}"
        );
        assert_eq!(menu.as_list(), vec![x, y]);
        assert_eq!(backend.menu_items(handle).unwrap(), before);
    }

    #[test]
    fn failed_native_insert_rolls_back() {
        let (rt, backend) = runtime();
        let first = MenuItem::string(&rt, "first").unwrap();
        let menu = Menu::new(&rt, [first.clone()]).unwrap();

        backend.fail_next(NativeOp::InsertItem, 1456);
        let err = menu
            .append_item(MenuItem::string(&rt, "second").unwrap())
            .unwrap_err();
        assert!(matches!(err, TrayError::Native(ref e) if e.code == 1456));
        assert_eq!(menu.as_list(), vec![first.clone()]);
        assert_eq!(native_ids(&backend, &menu), vec![first.id()]);
    }

    #[test]
    fn circular_submenus_are_rejected() {
        let (rt, backend) = runtime();
        let a = Menu::empty(&rt).unwrap();
        let b = Menu::empty(&rt).unwrap();
        let c = Menu::empty(&rt).unwrap();
        a.append_item(MenuItem::submenu(&rt, "to b", &b).unwrap()).unwrap();
        b.append_item(MenuItem::submenu(&rt, "to c", &c).unwrap()).unwrap();

        let back_to_a = MenuItem::submenu(&rt, "to a", &a).unwrap();
        assert!(matches!(
            c.insert_item(0, back_to_a.clone()),
            Err(TrayError::CircularReference)
        ));
        assert!(c.is_empty());
        assert!(native_ids(&backend, &c).is_empty());

        let to_self = MenuItem::submenu(&rt, "self", &a).unwrap();
        assert!(matches!(
            a.append_item(to_self),
            Err(TrayError::CircularReference)
        ));
        assert_eq!(a.len(), 1);

        // Sharing a submenu between siblings is not a cycle.
        let d = Menu::empty(&rt).unwrap();
        d.append_item(MenuItem::submenu(&rt, "c again", &c).unwrap()).unwrap();
        a.append_item(MenuItem::submenu(&rt, "to d", &d).unwrap()).unwrap();
    }

    #[test]
    fn concurrent_appends_keep_native_order() {
        const N: usize = 100;
        let (rt, backend) = runtime();
        let menu = Menu::empty(&rt).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|t| {
                let rt = rt.clone();
                let menu = menu.clone();
                thread::spawn(move || {
                    for i in 0..N {
                        let item = MenuItem::string(&rt, format!("{t}-{i}")).unwrap();
                        menu.append_item(item).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let items = menu.as_list();
        assert_eq!(items.len(), 2 * N);
        assert_eq!(native_ids(&backend, &menu), ids(&items));
    }

    #[test]
    fn drop_detaches_submenus_before_destroying() {
        let (rt, backend) = runtime();
        let child = Menu::new(&rt, [MenuItem::string(&rt, "leaf").unwrap()]).unwrap();
        let parent = Menu::new(&rt, [MenuItem::submenu(&rt, "child", &child).unwrap()]).unwrap();
        let parent_handle = parent.native_handle();

        drop(parent);
        assert!(!backend.menu_exists(parent_handle));
        assert!(backend.menu_exists(child.native_handle()));
        assert_eq!(backend.menu_items(child.native_handle()).unwrap().len(), 1);
    }

    #[test]
    fn popup_returns_selection_and_runs_callback() {
        let (rt, backend) = runtime();
        let a = MenuItem::string(&rt, "A").unwrap();
        let b = MenuItem::check(&rt, "B", false).unwrap();
        let (tx, rx) = mpsc::channel();
        b.set_callback(move |item| tx.send(item.id()).unwrap()).unwrap();
        let menu = Menu::new(&rt, [a, b.clone()]).unwrap();

        let options = PopupOptions::default().at(Point { x: 300, y: 400 });
        let popup_menu = menu.clone();
        let handle = thread::spawn(move || popup_menu.popup(&options));

        assert!(menu.wait_for_popup(5.0));
        let (handle_shown, request) = backend.last_popup().unwrap();
        assert_eq!(handle_shown, menu.native_handle());
        assert_eq!(request.position, Point { x: 300, y: 400 });
        backend.select_popup_item(menu.native_handle(), b.id()).unwrap();

        let selected = handle.join().unwrap().unwrap();
        assert_eq!(selected, Some(b.clone()));
        assert_eq!(rx.recv().unwrap(), b.id());
        // Selection does not toggle check items.
        assert_eq!(b.checked(), Some(false));
        assert!(!menu.wait_for_popup(-1.0));
        assert!(backend.windows(WindowKind::PopupOwner).is_empty());
    }

    #[test]
    fn close_returns_no_selection() {
        let (rt, backend) = runtime();
        let a = MenuItem::string(&rt, "A").unwrap();
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);
        a.set_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let menu = Menu::new(&rt, [a]).unwrap();
        backend.set_cursor_position(Point { x: 10, y: 20 });

        let options = PopupOptions::from_config(rt.config());
        let popup_menu = menu.clone();
        let handle = thread::spawn(move || popup_menu.popup(&options));

        assert!(menu.wait_for_popup(5.0));
        assert_eq!(backend.last_popup().unwrap().1.position, Point { x: 10, y: 20 });
        menu.close();

        assert_eq!(handle.join().unwrap().unwrap(), None);
        assert!(!menu.is_popup_active());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        menu.close();
    }

    #[test]
    fn popup_options_reach_native_call() {
        let (rt, backend) = runtime();
        let menu = Menu::new(&rt, [MenuItem::string(&rt, "A").unwrap()]).unwrap();
        let options = PopupOptions {
            position: Some(Point { x: 1, y: 2 }),
            horizontal: HorizontalAlign::Right,
            vertical: VerticalAlign::Bottom,
            allow_right_click: true,
        };

        let popup_menu = menu.clone();
        let handle = thread::spawn(move || popup_menu.popup(&options));
        assert!(menu.wait_for_popup(5.0));
        let request = backend.last_popup().unwrap().1;
        assert_eq!(request.horizontal, HorizontalAlign::Right);
        assert_eq!(request.vertical, VerticalAlign::Bottom);
        assert!(request.allow_right_click);
        menu.close();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn second_popup_of_same_menu_is_rejected() {
        let (rt, _backend) = runtime();
        let menu = Menu::new(&rt, [MenuItem::string(&rt, "A").unwrap()]).unwrap();

        let popup_menu = menu.clone();
        let handle = thread::spawn(move || popup_menu.popup(&PopupOptions::default()));
        assert!(menu.wait_for_popup(5.0));

        assert!(matches!(
            menu.popup(&PopupOptions::default()),
            Err(TrayError::PopupInProgress)
        ));
        menu.close();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn label_change_during_popup_reaches_native_menu() {
        let (rt, backend) = runtime();
        let leaf = MenuItem::string(&rt, "old leaf").unwrap();
        let child = Menu::new(&rt, [leaf.clone()]).unwrap();
        let top = MenuItem::string(&rt, "old top").unwrap();
        let menu = Menu::new(
            &rt,
            [top.clone(), MenuItem::submenu(&rt, "More", &child).unwrap()],
        )
        .unwrap();

        let popup_menu = menu.clone();
        let handle = thread::spawn(move || popup_menu.popup(&PopupOptions::default()));
        assert!(menu.wait_for_popup(5.0));

        top.set_label("new top").unwrap();
        leaf.set_label("new leaf").unwrap();

        let label_at = |menu: &Menu, position: usize| {
            backend.menu_items(menu.native_handle()).unwrap()[position]
                .label
                .clone()
        };
        assert!(wait_for(|| label_at(&menu, 0).as_deref() == Some("new top")));
        assert!(wait_for(|| label_at(&child, 0).as_deref() == Some("new leaf")));

        menu.close();
        assert_eq!(handle.join().unwrap().unwrap(), None);
    }

    #[test]
    fn changes_while_closed_are_synced_before_next_popup() {
        let (rt, backend) = runtime();
        let item = MenuItem::string(&rt, "before").unwrap();
        let menu = Menu::new(&rt, [item.clone()]).unwrap();
        item.set_label("after").unwrap();
        assert_eq!(
            backend.menu_items(menu.native_handle()).unwrap()[0].label.as_deref(),
            Some("before")
        );

        let popup_menu = menu.clone();
        let handle = thread::spawn(move || popup_menu.popup(&PopupOptions::default()));
        assert!(menu.wait_for_popup(5.0));
        assert_eq!(
            backend.menu_items(menu.native_handle()).unwrap()[0].label.as_deref(),
            Some("after")
        );
        menu.close();
        handle.join().unwrap().unwrap();
    }
}
