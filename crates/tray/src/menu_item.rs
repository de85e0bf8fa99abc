//! Menu items.
//!
//! Items are shared handles: the same item may sit in several menus, and a
//! change made from any thread is pushed to every popup currently showing it.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use traykit_native::{ItemDescriptor, NativeItemType};

use crate::error::{Result, TrayError};
use crate::menu::Menu;
use crate::runtime::{Shared, TrayRuntime};

/// Callback invoked with the item the user selected.
pub type ItemCallback = Arc<dyn Fn(&MenuItem) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Separator,
    String,
    Check,
    Submenu,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Separator => "separator",
            Self::String => "string",
            Self::Check => "check",
            Self::Submenu => "submenu",
        })
    }
}

enum Payload {
    Separator,
    String {
        label: String,
        callback: Option<ItemCallback>,
    },
    Check {
        label: String,
        checked: bool,
        radio: bool,
        callback: Option<ItemCallback>,
    },
    Submenu {
        label: String,
        menu: Menu,
    },
}

impl Payload {
    fn kind(&self) -> ItemKind {
        match self {
            Self::Separator => ItemKind::Separator,
            Self::String { .. } => ItemKind::String,
            Self::Check { .. } => ItemKind::Check,
            Self::Submenu { .. } => ItemKind::Submenu,
        }
    }
}

struct ItemState {
    payload: Payload,
    enabled: bool,
    /// Bumped on every change the native menu must reflect.
    update_counter: u64,
}

pub(crate) struct ItemInner {
    id: u32,
    shared: Arc<Shared>,
    state: Mutex<ItemState>,
}

impl Drop for ItemInner {
    fn drop(&mut self) {
        let _ = self.shared.items.delete(self.id);
    }
}

/// A popup menu entry.
#[derive(Clone)]
pub struct MenuItem {
    inner: Arc<ItemInner>,
}

impl MenuItem {
    pub fn separator(runtime: &TrayRuntime) -> Result<Self> {
        Self::build(runtime, Payload::Separator)
    }

    pub fn string(runtime: &TrayRuntime, label: impl Into<String>) -> Result<Self> {
        Self::build(
            runtime,
            Payload::String {
                label: label.into(),
                callback: None,
            },
        )
    }

    pub fn check(runtime: &TrayRuntime, label: impl Into<String>, checked: bool) -> Result<Self> {
        Self::build(
            runtime,
            Payload::Check {
                label: label.into(),
                checked,
                radio: false,
                callback: None,
            },
        )
    }

    /// A check item drawn with a radio bullet.
    pub fn radio(runtime: &TrayRuntime, label: impl Into<String>, checked: bool) -> Result<Self> {
        Self::build(
            runtime,
            Payload::Check {
                label: label.into(),
                checked,
                radio: true,
                callback: None,
            },
        )
    }

    pub fn submenu(runtime: &TrayRuntime, label: impl Into<String>, menu: &Menu) -> Result<Self> {
        Self::build(
            runtime,
            Payload::Submenu {
                label: label.into(),
                menu: menu.clone(),
            },
        )
    }

    fn build(runtime: &TrayRuntime, payload: Payload) -> Result<Self> {
        let shared = runtime.shared();
        let mut created = None;
        shared.items.allocate_with(|id| {
            let inner = Arc::new(ItemInner {
                id,
                shared: Arc::clone(shared),
                state: Mutex::new(ItemState {
                    payload,
                    enabled: true,
                    update_counter: 0,
                }),
            });
            let weak = Arc::downgrade(&inner);
            created = Some(inner);
            weak
        })?;
        created
            .map(|inner| Self { inner })
            .ok_or_else(|| TrayError::Internal("item allocation produced no item".into()))
    }

    /// Resolves a live item by id.
    pub(crate) fn lookup(shared: &Shared, id: u32) -> Option<Self> {
        shared
            .items
            .get(id)
            .and_then(|weak| weak.upgrade())
            .map(|inner| Self { inner })
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn kind(&self) -> ItemKind {
        self.inner.state.lock().payload.kind()
    }

    /// The label, or `None` for a separator.
    pub fn label(&self) -> Option<String> {
        match &self.inner.state.lock().payload {
            Payload::Separator => None,
            Payload::String { label, .. }
            | Payload::Check { label, .. }
            | Payload::Submenu { label, .. } => Some(label.clone()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.inner.state.lock().enabled
    }

    /// Checked state, or `None` unless this is a check item.
    pub fn checked(&self) -> Option<bool> {
        match self.inner.state.lock().payload {
            Payload::Check { checked, .. } => Some(checked),
            _ => None,
        }
    }

    /// Whether this is a check item drawn with a radio bullet.
    pub fn is_radio(&self) -> bool {
        matches!(self.inner.state.lock().payload, Payload::Check { radio: true, .. })
    }

    /// The menu opened by a submenu item.
    pub fn child_menu(&self) -> Option<Menu> {
        match &self.inner.state.lock().payload {
            Payload::Submenu { menu, .. } => Some(menu.clone()),
            _ => None,
        }
    }

    pub fn update_counter(&self) -> u64 {
        self.inner.state.lock().update_counter
    }

    pub fn set_label(&self, label: impl Into<String>) -> Result<()> {
        let label = label.into();
        self.mutate("label", move |payload| match payload {
            Payload::Separator => false,
            Payload::String { label: current, .. }
            | Payload::Check { label: current, .. }
            | Payload::Submenu { label: current, .. } => {
                *current = label;
                true
            }
        })
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            state.enabled = enabled;
            state.update_counter += 1;
        }
        self.notify_changed();
        Ok(())
    }

    /// Sets the checked state. Selecting a check item never toggles it;
    /// callbacks decide.
    pub fn set_checked(&self, checked: bool) -> Result<()> {
        self.mutate("checked", move |payload| match payload {
            Payload::Check { checked: current, .. } => {
                *current = checked;
                true
            }
            _ => false,
        })
    }

    pub fn set_radio(&self, radio: bool) -> Result<()> {
        self.mutate("radio", move |payload| match payload {
            Payload::Check { radio: current, .. } => {
                *current = radio;
                true
            }
            _ => false,
        })
    }

    /// Installs the selection callback of a string or check item.
    pub fn set_callback(&self, callback: impl Fn(&MenuItem) + Send + Sync + 'static) -> Result<()> {
        self.replace_callback(Some(Arc::new(callback)))
    }

    pub fn clear_callback(&self) -> Result<()> {
        self.replace_callback(None)
    }

    pub fn has_callback(&self) -> bool {
        match &self.inner.state.lock().payload {
            Payload::String { callback, .. } | Payload::Check { callback, .. } => {
                callback.is_some()
            }
            _ => false,
        }
    }

    fn replace_callback(&self, new: Option<ItemCallback>) -> Result<()> {
        let mut state = self.inner.state.lock();
        match &mut state.payload {
            Payload::String { callback, .. } | Payload::Check { callback, .. } => {
                *callback = new;
                Ok(())
            }
            payload => Err(TrayError::UnsupportedProperty {
                kind: payload.kind(),
                property: "callback",
            }),
        }
    }

    /// Applies `update` to the payload; `false` means the kind lacks `property`.
    fn mutate(
        &self,
        property: &'static str,
        update: impl FnOnce(&mut Payload) -> bool,
    ) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            let kind = state.payload.kind();
            if !update(&mut state.payload) {
                return Err(TrayError::UnsupportedProperty { kind, property });
            }
            state.update_counter += 1;
        }
        self.notify_changed();
        Ok(())
    }

    fn notify_changed(&self) {
        let shared = &self.inner.shared;
        shared.popups.notify_item_changed(shared.backend.as_ref(), self);
    }

    /// Runs the selection callback, if any, with no lock held.
    pub(crate) fn invoke_callback(&self) {
        let callback = match &self.inner.state.lock().payload {
            Payload::String { callback, .. } | Payload::Check { callback, .. } => callback.clone(),
            _ => None,
        };
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// Native form of the item, plus its submenu for recursive syncing.
    pub(crate) fn descriptor(&self) -> (ItemDescriptor, Option<Menu>) {
        let state = self.inner.state.lock();
        let (item_type, label, checked, submenu) = match &state.payload {
            Payload::Separator => (NativeItemType::Separator, None, false, None),
            Payload::String { label, .. } => {
                (NativeItemType::String, Some(label.clone()), false, None)
            }
            Payload::Check {
                label,
                checked,
                radio,
                ..
            } => (
                NativeItemType::Check { radio: *radio },
                Some(label.clone()),
                *checked,
                None,
            ),
            Payload::Submenu { label, menu } => (
                NativeItemType::Submenu(menu.native_handle()),
                Some(label.clone()),
                false,
                Some(menu.clone()),
            ),
        };
        let descriptor = ItemDescriptor {
            id: self.inner.id,
            item_type,
            label,
            enabled: state.enabled,
            checked,
            synced_counter: state.update_counter,
        };
        (descriptor, submenu)
    }
}

impl PartialEq for MenuItem {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MenuItem {}

impl fmt::Debug for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuItem")
            .field("id", &self.inner.id)
            .field("kind", &self.kind())
            .field("label", &self.label())
            .finish()
    }
}
