use shared::domain::{LayoutState, LAYOUT_STORAGE_KEY};
use storage::{get_typed, set_typed, SharedStore};
use std::sync::PoisonError;
use tracing::{debug, warn};

/// Reads and writes a console's [`LayoutState`]. Without a store every call
/// is a no-op.
#[derive(Clone, Default)]
pub struct LayoutPersistence {
    store: Option<SharedStore>,
}

impl LayoutPersistence {
    pub fn new(store: Option<SharedStore>) -> Self {
        Self { store }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn restore(&self) -> Option<LayoutState> {
        let store = self.store.as_ref()?;
        let store = store.lock().unwrap_or_else(PoisonError::into_inner);
        let layout = get_typed::<LayoutState>(&*store, LAYOUT_STORAGE_KEY);
        debug!(?layout, "console: restored layout");
        layout
    }

    /// Failures are logged; losing a layout write never interrupts the console.
    pub fn persist(&self, layout: LayoutState) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = set_typed(&mut *store, LAYOUT_STORAGE_KEY, &layout) {
            warn!("console: failed to record layout: {err}");
            return;
        }
        if let Err(err) = store.save() {
            warn!("console: failed to save layout: {err}");
        }
    }
}
