//! Synchronous, typed publish/subscribe.
//!
//! Every stateful entity in the core owns one [`Notifier`] per event type
//! and emits into it as part of the operation that caused the event, so
//! listeners observe events in exactly the order operations were invoked.
//!
//! Emission iterates over a snapshot of the listener list. A listener may
//! therefore subscribe, unsubscribe, or trigger a nested emission on the
//! same notifier without invalidating the loop. A listener removed during
//! an emission still receives that one event.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A registered event listener.
pub type Listener<E> = Rc<dyn Fn(&E)>;

/// Handle returned by [`Notifier::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// A list of listeners for one event type.
pub struct Notifier<E> {
    /// Next identifier to hand out.
    next_id: Cell<u64>,
    /// Registered listeners in subscription order.
    listeners: RefCell<Vec<(ListenerId, Listener<E>)>>,
}

impl<E: 'static> Notifier<E> {
    /// Create a notifier with no listeners.
    pub const fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Register a listener. Listeners are called in subscription order.
    pub fn subscribe(&self, listener: impl Fn(&E) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(self.next_id.get().wrapping_add(1));
        let listener: Listener<E> = Rc::new(listener);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Deliver an event to every listener registered at the time of the call.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(event);
        }
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }
}

impl<E: 'static> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> core::fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_run_in_subscription_order() {
        let notifier: Notifier<u32> = Notifier::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&log);
        notifier.subscribe(move |value| first.borrow_mut().push(("first", *value)));
        let second = Rc::clone(&log);
        notifier.subscribe(move |value| second.borrow_mut().push(("second", *value)));

        notifier.emit(&7);
        assert_eq!(*log.borrow(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let notifier: Notifier<()> = Notifier::new();
        let count = Rc::new(Cell::new(0_u32));

        let counter = Rc::clone(&count);
        let id = notifier.subscribe(move |_| counter.set(counter.get().saturating_add(1)));

        notifier.emit(&());
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.emit(&());

        assert_eq!(count.get(), 1);
        assert!(notifier.is_empty());
    }

    #[test]
    fn listener_may_unsubscribe_itself_while_emitting() {
        let notifier: Rc<Notifier<()>> = Rc::new(Notifier::new());
        let own_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        let calls = Rc::new(Cell::new(0_u32));

        let weak = Rc::downgrade(&notifier);
        let id_slot = Rc::clone(&own_id);
        let counter = Rc::clone(&calls);
        let id = notifier.subscribe(move |_| {
            counter.set(counter.get().saturating_add(1));
            if let (Some(notifier), Some(id)) = (weak.upgrade(), id_slot.get()) {
                notifier.unsubscribe(id);
            }
        });
        own_id.set(Some(id));

        notifier.emit(&());
        notifier.emit(&());
        assert_eq!(calls.get(), 1);
        assert_eq!(notifier.len(), 0);
    }
}
