use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
};
use crossbeam_skiplist::SkipSet;

/// An event a host emits to plugin listeners.
pub trait Event: fmt::Debug + Send + Sync {
    /// What each listener callback returns.
    type HandlerReturnType: fmt::Debug;

    /// Folds a listener's return value back into the event.
    ///
    /// Called once per listener, right after its callback returns. The default
    /// ignores the value.
    fn update(&mut self, _handler_result: Self::HandlerReturnType) {}
}

type Callback<E> = dyn Fn(&E) -> <E as Event>::HandlerReturnType + Send + Sync;

#[derive(Debug)]
struct ListenerEntry<E: Event> {
    // The registration owns the strong reference; the list only observes it.
    callback: Weak<Callback<E>>,
    order: usize,
}

impl<E: Event> Eq for ListenerEntry<E> {}

impl<E: Event> PartialEq for ListenerEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl<E: Event> Ord for ListenerEntry<E> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order.cmp(&other.order)
    }
}

impl<E: Event> PartialOrd for ListenerEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

static NEXT_LISTENER_ORDER: AtomicUsize = AtomicUsize::new(0);

/// Listeners registered for one event type, called in registration order.
///
/// The list holds weak references only. A plugin stays subscribed for exactly as
/// long as it keeps the [`Listener`] returned at registration; dropping it
/// unsubscribes, and the stale entry is pruned on the next dispatch.
pub struct ListenerList<E: Event> {
    inner: SkipSet<ListenerEntry<E>>,
}

impl<E: Event + 'static> ListenerList<E> {
    pub fn new() -> Self {
        ListenerList {
            inner: SkipSet::new(),
        }
    }

    /// Calls every live listener with `event`, then removes entries whose
    /// registration has been dropped.
    pub fn dispatch(&self, event: &mut E) {
        let mut stale = Vec::new();

        for entry in self.inner.iter() {
            match entry.callback.upgrade() {
                Some(callback) => {
                    let result = callback(event);
                    event.update(result);
                }
                None => stale.push(entry.order),
            }
        }

        if stale.is_empty() {
            return;
        }

        // Removal goes by order; the callback in the lookup key is never called.
        let placeholder: Arc<Callback<E>> = Arc::new(Self::placeholder);
        for order in stale {
            self.inner.remove(&ListenerEntry {
                callback: Arc::downgrade(&placeholder),
                order,
            });
        }
    }

    fn placeholder(_: &E) -> E::HandlerReturnType {
        unreachable!()
    }

    /// Number of entries, including ones not yet pruned.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of listeners whose registration is still alive.
    pub fn live_count(&self) -> usize {
        self.inner
            .iter()
            .filter(|entry| entry.callback.strong_count() > 0)
            .count()
    }
}

impl<E: Event + 'static> Default for ListenerList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for ListenerList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("listener_count", &self.inner.len())
            .finish()
    }
}

/// A live subscription. Dropping it unsubscribes the callback.
pub struct Listener<E: Event> {
    #[allow(dead_code)] // held only to keep the callback alive
    arc: Arc<Callback<E>>,
    order: usize,
}

impl<E: Event + 'static> Listener<E> {
    /// Registers `callback` with `listeners` and returns the subscription.
    pub fn new<F>(listeners: &ListenerList<E>, callback: F) -> Self
    where
        F: Fn(&E) -> E::HandlerReturnType + Send + Sync + 'static,
    {
        let order = NEXT_LISTENER_ORDER.fetch_add(1, Ordering::SeqCst);
        let arc: Arc<Callback<E>> = Arc::new(callback);
        listeners.inner.insert(ListenerEntry {
            callback: Arc::downgrade(&arc),
            order,
        });

        Listener { arc, order }
    }
}

impl<E: Event> fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("order", &self.order)
            .finish()
    }
}

/// Declares a struct with one public `ListenerList` per named event.
macro_rules! define_event_listeners {
    ($struct_name:ident { $($field_name:ident: $event_type:ty),* $(,)? }) => {
        /// Listener lists for the events this host emits.
        #[derive(Debug, Default)]
        pub struct $struct_name {
            $(
                pub $field_name: $crate::event::ListenerList<$event_type>,
            )*
        }

        impl $struct_name {
            pub fn new() -> Self {
                Self {
                    $(
                        $field_name: $crate::event::ListenerList::new(),
                    )*
                }
            }
        }
    };
}

pub(crate) use define_event_listeners;
