//! Canvas clicks → shared interaction store.
//!
//! The canvas can only push clicks into a callback; the rest of the page
//! reads selection from a store. The bridge connects the two with a
//! single-slot mailbox:
//!
//! ```text
//! click listener ──put──▶ ClickHolder ◀──peek── InteractionPoller ──publish──▶ InteractionStore
//! ```
//!
//! The poller republishes only when the holder differs from what it last
//! published, so a quiet holder costs nothing and each change is published
//! exactly once. A holder that goes back to empty publishes one clear.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::SurfaceError;
use crate::surface::{CanvasClick, SceneSurface};

/// A click that resolved to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickRecord {
    pub identity: String,
    pub timestamp_ms: u64,
}

/// Single-slot mailbox shared by the click listener and the poller.
#[derive(Debug, Clone, Default)]
pub struct ClickHolder {
    slot: Rc<RefCell<Option<ClickRecord>>>,
}

impl ClickHolder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot.
    pub fn put(&self, record: ClickRecord) {
        *self.slot.borrow_mut() = Some(record);
    }

    /// Empty the slot.
    pub fn clear(&self) {
        self.slot.borrow_mut().take();
    }

    /// Copy of the current value.
    #[must_use]
    pub fn peek(&self) -> Option<ClickRecord> {
        self.slot.borrow().clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.borrow().is_none()
    }
}

/// What the poller published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionEvent {
    Selected(ClickRecord),
    Cleared,
}

/// Destination of published interaction events.
pub trait InteractionStore {
    fn publish(&mut self, event: &InteractionEvent);
}

#[derive(Debug, Default)]
struct StoreInner {
    value: Option<ClickRecord>,
    publishes: u64,
}

/// Single-threaded store keeping the latest selection and a publish count.
///
/// Clones share the same underlying value.
#[derive(Debug, Clone, Default)]
pub struct SharedInteractionStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl SharedInteractionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn value(&self) -> Option<ClickRecord> {
        self.inner.borrow().value.clone()
    }

    #[must_use]
    pub fn selected_identity(&self) -> Option<String> {
        self.inner.borrow().value.as_ref().map(|r| r.identity.clone())
    }

    /// Number of publishes, clears included.
    #[must_use]
    pub fn publish_count(&self) -> u64 {
        self.inner.borrow().publishes
    }
}

impl InteractionStore for SharedInteractionStore {
    fn publish(&mut self, event: &InteractionEvent) {
        let mut inner = self.inner.borrow_mut();
        inner.value = match event {
            InteractionEvent::Selected(record) => Some(record.clone()),
            InteractionEvent::Cleared => None,
        };
        inner.publishes += 1;
    }
}

/// Compare-and-publish step, driven by the host's poll timer.
#[derive(Debug, Clone, Default)]
pub struct InteractionPoller {
    last_published: Option<ClickRecord>,
}

impl InteractionPoller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the holder's value if it changed since the last publish.
    pub fn poll<T: InteractionStore + ?Sized>(
        &mut self,
        holder: &ClickHolder,
        store: &mut T,
    ) -> Option<InteractionEvent> {
        let current = holder.peek();
        if current == self.last_published {
            return None;
        }
        let event = match &current {
            Some(record) => InteractionEvent::Selected(record.clone()),
            None => InteractionEvent::Cleared,
        };
        store.publish(&event);
        tracing::debug!(
            identity = current.as_ref().map(|r| r.identity.as_str()),
            "interaction published"
        );
        self.last_published = current;
        Some(event)
    }

    #[must_use]
    pub fn last_published(&self) -> Option<&ClickRecord> {
        self.last_published.as_ref()
    }
}

/// Owns the holder and the poller and installs the click listener.
#[derive(Debug, Default)]
pub struct InteractionBridge {
    holder: ClickHolder,
    poller: InteractionPoller,
    installs: u64,
}

impl InteractionBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the mailbox.
    #[must_use]
    pub fn holder(&self) -> &ClickHolder {
        &self.holder
    }

    /// Number of listeners this bridge has installed.
    #[must_use]
    pub fn installs(&self) -> u64 {
        self.installs
    }

    /// Install the click listener unless the canvas already has one.
    ///
    /// Returns `Ok(true)` when a listener was installed by this call.
    pub fn ensure_attached<S: SceneSurface + ?Sized>(
        &mut self,
        surface: &mut S,
    ) -> Result<bool, SurfaceError> {
        if surface.click_listener_attached() {
            return Ok(false);
        }
        let holder = self.holder.clone();
        surface.install_click_listener(Box::new(move |click: CanvasClick| {
            // Clicks on static layers or empty canvas leave the holder alone.
            if let Some(identity) = click.identity {
                holder.put(ClickRecord {
                    identity,
                    timestamp_ms: click.timestamp_ms,
                });
            }
        }))?;
        self.installs += 1;
        tracing::debug!(installs = self.installs, "click listener installed");
        Ok(true)
    }

    /// Empty the holder, e.g. when the session changes.
    pub fn clear_holder(&self) {
        self.holder.clear();
    }

    /// Run one poll against `store`.
    pub fn poll<T: InteractionStore + ?Sized>(
        &mut self,
        store: &mut T,
    ) -> Option<InteractionEvent> {
        self.poller.poll(&self.holder, store)
    }
}
