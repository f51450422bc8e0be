//! Change callbacks.
//!
//! Each property bag has one slot. Registering replaces whatever was there;
//! registering `None` clears it. Handlers receive an owned copy of the diff,
//! so nothing they do can reach back into the store.

use std::fmt;
use twin_types::PropertyTree;

/// A registered change handler.
pub type ChangeHandler = Box<dyn FnMut(PropertyTree) + Send>;

/// Which property bag a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bag {
    /// Desired properties.
    Desired,
    /// Reported properties.
    Reported,
    /// Tags.
    Tags,
}

/// Holder for at most one handler.
#[derive(Default)]
pub struct ChangeSlot {
    handler: Option<ChangeHandler>,
}

impl ChangeSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`, replacing any previous one.
    pub fn set<F>(&mut self, handler: F)
    where
        F: FnMut(PropertyTree) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    /// Register or clear, returning what was there.
    pub fn replace(&mut self, handler: Option<ChangeHandler>) -> Option<ChangeHandler> {
        std::mem::replace(&mut self.handler, handler)
    }

    /// Remove the handler.
    pub fn clear(&mut self) {
        self.handler = None;
    }

    /// Whether a handler is registered.
    pub fn is_registered(&self) -> bool {
        self.handler.is_some()
    }

    /// Invoke the handler with a copy of `diff`. Returns whether it ran.
    pub fn notify(&mut self, diff: &PropertyTree) -> bool {
        match self.handler.as_mut() {
            Some(handler) => {
                handler(diff.clone());
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for ChangeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSlot")
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// The three per-document slots.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    desired: ChangeSlot,
    reported: ChangeSlot,
    tags: ChangeSlot,
}

impl ChangeNotifier {
    /// Create a notifier with every slot empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `bag`.
    pub fn slot(&self, bag: Bag) -> &ChangeSlot {
        match bag {
            Bag::Desired => &self.desired,
            Bag::Reported => &self.reported,
            Bag::Tags => &self.tags,
        }
    }

    /// Mutable access to the slot for `bag`.
    pub fn slot_mut(&mut self, bag: Bag) -> &mut ChangeSlot {
        match bag {
            Bag::Desired => &mut self.desired,
            Bag::Reported => &mut self.reported,
            Bag::Tags => &mut self.tags,
        }
    }

    /// Notify `bag`'s handler when `diff` is present and non-empty.
    pub fn notify(&mut self, bag: Bag, diff: Option<&PropertyTree>) -> bool {
        match diff {
            Some(diff) if !diff.is_empty() => {
                let fired = self.slot_mut(bag).notify(diff);
                if fired {
                    tracing::debug!(?bag, changed = diff.len(), "change callback fired");
                }
                fired
            }
            _ => false,
        }
    }
}
