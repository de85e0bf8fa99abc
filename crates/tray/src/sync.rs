//! Diff-sync between the in-memory item lists and native menus.
//!
//! Each native entry stores the update counter of the item it was last
//! written from. An entry whose stored counter matches its item is skipped.
//! Submenu entries are always rewritten after their own list is synced.

use tracing::trace;
use traykit_native::{MenuHandle, NativeBackend};

use crate::error::{Result, TrayError};
use crate::menu::Menu;
use crate::menu_item::MenuItem;

/// Inserts every item into an empty native menu.
pub(crate) fn insert_all(
    backend: &dyn NativeBackend,
    handle: MenuHandle,
    items: &[MenuItem],
) -> Result<()> {
    let count = backend.menu_item_count(handle)?;
    if count != 0 {
        return Err(TrayError::Internal(format!(
            "menu size mismatch: native menu already has {count} entries"
        )));
    }
    for (position, item) in items.iter().enumerate() {
        insert_item(backend, handle, position, item)?;
    }
    Ok(())
}

pub(crate) fn insert_item(
    backend: &dyn NativeBackend,
    handle: MenuHandle,
    position: usize,
    item: &MenuItem,
) -> Result<()> {
    let (descriptor, _) = item.descriptor();
    backend.insert_menu_item(handle, position, &descriptor)?;
    Ok(())
}

/// Brings the whole tree under `menu` up to date.
pub(crate) fn update_menu(backend: &dyn NativeBackend, menu: &Menu) -> Result<()> {
    let items = menu.inner.items.lock();
    update_all(backend, menu.native_handle(), &items)
}

fn update_all(backend: &dyn NativeBackend, handle: MenuHandle, items: &[MenuItem]) -> Result<()> {
    let count = backend.menu_item_count(handle)?;
    if count != items.len() {
        return Err(TrayError::Internal(format!(
            "menu size mismatch: {} items, {count} native entries",
            items.len()
        )));
    }
    for (position, item) in items.iter().enumerate() {
        update_item(backend, handle, position, item)?;
    }
    Ok(())
}

fn update_item(
    backend: &dyn NativeBackend,
    handle: MenuHandle,
    position: usize,
    item: &MenuItem,
) -> Result<()> {
    let (descriptor, submenu) = item.descriptor();
    match submenu {
        Some(submenu) => update_menu(backend, &submenu)?,
        None => {
            let native = backend.menu_item_info(handle, position)?;
            if native.id != descriptor.id {
                return Err(TrayError::Internal(format!(
                    "menu item id doesn't match: expected {}, native menu has {}",
                    descriptor.id, native.id
                )));
            }
            if native.synced_counter == descriptor.synced_counter {
                return Ok(());
            }
        }
    }
    backend.set_menu_item(handle, position, &descriptor)?;
    trace!(menu = handle.raw(), item = descriptor.id, position, "menu item synced");
    Ok(())
}

/// Updates every occurrence of `item` in the tree under `menu`.
///
/// Returns whether the item was found.
pub(crate) fn update_item_in_tree(
    backend: &dyn NativeBackend,
    menu: &Menu,
    item: &MenuItem,
) -> Result<bool> {
    let items = menu.inner.items.lock();
    let mut found = false;
    for (position, entry) in items.iter().enumerate() {
        if entry == item {
            update_item(backend, menu.native_handle(), position, entry)?;
            found = true;
        } else if let Some(submenu) = entry.child_menu() {
            found |= update_item_in_tree(backend, &submenu, item)?;
        }
    }
    Ok(found)
}
