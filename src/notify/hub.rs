//! Change hub: fans a change signal out to listeners and up the tree.

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::subscription::ChangeSubscription;

type Callback = Box<dyn FnMut() + Send>;

/// A registered observer.
enum Listener {
    Callback(Callback),
    Channel(Sender<()>),
}

impl Listener {
    /// Deliver one signal. Returns false if the listener is gone for good.
    fn deliver(&mut self) -> bool {
        match self {
            Listener::Callback(callback) => {
                callback();
                true
            }
            // A full buffer already means a re-read is pending.
            Listener::Channel(sender) => match sender.try_send(()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            },
        }
    }
}

struct HubInner {
    listeners: Mutex<Vec<Listener>>,
    /// Hub of the collection owning the record this collection hangs off.
    upstream: Mutex<Option<ChangeHub>>,
    /// Set while listeners are being invoked.
    firing: AtomicBool,
    /// Outstanding hold guards.
    holds: AtomicUsize,
    /// A fire arrived while held.
    pending: AtomicBool,
}

/// Per-collection change notifier.
///
/// Cloning the hub clones the handle, not the listeners: both clones fire
/// the same observers. A fire runs the hub's own listeners, then bubbles to
/// the upstream hub, so a change three levels deep still reaches the root.
#[derive(Clone)]
pub struct ChangeHub {
    inner: Arc<HubInner>,
}

impl ChangeHub {
    /// Create a hub with no listeners and no upstream link.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                listeners: Mutex::new(Vec::new()),
                upstream: Mutex::new(None),
                firing: AtomicBool::new(false),
                holds: AtomicUsize::new(0),
                pending: AtomicBool::new(false),
            }),
        }
    }

    /// Register a zero-argument change callback.
    pub fn on_change<F>(&self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.inner
            .listeners
            .lock()
            .push(Listener::Callback(Box::new(callback)));
    }

    /// Subscribe through a bounded channel.
    ///
    /// Signals are dropped while the buffer is full. Dropping the returned
    /// subscription unregisters it on the next fire.
    pub fn subscribe(&self, buffer: usize) -> ChangeSubscription {
        let (sender, receiver) = bounded(buffer.max(1));
        self.inner.listeners.lock().push(Listener::Channel(sender));
        ChangeSubscription::new(receiver)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Remove every listener. The upstream link is kept.
    pub fn clear_listeners(&self) {
        self.inner.listeners.lock().clear();
    }

    /// Link this hub under `parent`.
    ///
    /// Re-linking to the same parent is a no-op. A link that would close a
    /// cycle is refused.
    pub fn link_upstream(&self, parent: &ChangeHub) {
        let mut cursor = Some(parent.clone());
        while let Some(hub) = cursor {
            if hub.same_as(self) {
                tracing::warn!("refusing change hub link that would form a cycle");
                return;
            }
            cursor = hub.upstream();
        }
        *self.inner.upstream.lock() = Some(parent.clone());
    }

    /// Drop the upstream link.
    pub fn unlink(&self) {
        *self.inner.upstream.lock() = None;
    }

    pub fn upstream(&self) -> Option<ChangeHub> {
        self.inner.upstream.lock().clone()
    }

    /// Whether both handles point at the same hub.
    pub fn same_as(&self, other: &ChangeHub) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Defer fires until the returned guard (and every other guard) drops.
    ///
    /// Any number of fires while held collapse into a single delivery.
    pub fn hold(&self) -> HoldGuard {
        self.inner.holds.fetch_add(1, Ordering::AcqRel);
        HoldGuard { hub: self.clone() }
    }

    /// Whether at least one hold guard is alive.
    pub fn is_held(&self) -> bool {
        self.inner.holds.load(Ordering::Acquire) > 0
    }

    /// Notify listeners, then bubble upstream.
    pub fn fire(&self) {
        if self.is_held() {
            self.inner.pending.store(true, Ordering::Release);
            return;
        }

        if self.inner.firing.swap(true, Ordering::AcqRel) {
            tracing::warn!("suppressed reentrant change notification");
            return;
        }

        let mut fan_out = FanOut::begin(&self.inner);
        fan_out.deliver();

        let upstream = self.upstream();
        if let Some(parent) = upstream {
            parent.fire();
        }
    }
}

/// Listeners taken out of a hub for one delivery round.
///
/// Listeners run outside the lock so they may register more listeners. On
/// drop, including while unwinding from a panicking callback, the survivors
/// go back in front of any added meanwhile and the firing flag is cleared.
struct FanOut<'a> {
    inner: &'a HubInner,
    current: Vec<Listener>,
}

impl<'a> FanOut<'a> {
    fn begin(inner: &'a HubInner) -> Self {
        let current = std::mem::take(&mut *inner.listeners.lock());
        Self { inner, current }
    }

    fn deliver(&mut self) {
        self.current.retain_mut(|listener| listener.deliver());
    }
}

impl Drop for FanOut<'_> {
    fn drop(&mut self) {
        let mut listeners = self.inner.listeners.lock();
        let added = std::mem::take(&mut *listeners);
        let mut restored = std::mem::take(&mut self.current);
        restored.extend(added);
        *listeners = restored;
        drop(listeners);

        self.inner.firing.store(false, Ordering::Release);
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeHub")
            .field("listeners", &self.listener_count())
            .field("linked", &self.inner.upstream.lock().is_some())
            .field("held", &self.is_held())
            .finish()
    }
}

/// Coalesces fires on a hub while alive.
#[must_use = "dropping the guard immediately releases the hold"]
pub struct HoldGuard {
    hub: ChangeHub,
}

impl Drop for HoldGuard {
    fn drop(&mut self) {
        let inner = &self.hub.inner;
        if inner.holds.fetch_sub(1, Ordering::AcqRel) == 1
            && inner.pending.swap(false, Ordering::AcqRel)
        {
            self.hub.fire();
        }
    }
}
