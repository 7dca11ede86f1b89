use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use slabmap::SlabMap;

use crate::{StateError, Subscription, Value};


pub(crate) type Callback = Rc<dyn Fn(&AnyState)>;

/// Identifies a registered callback.
///
/// Returned by [`Observable::on_change`] and accepted by [`Observable::remove_callback`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId {
    key: usize,
    seq: u64,
}

/// Ordered set of callbacks.
///
/// Slots are reused after removal, so each entry carries a sequence number that
/// restores registration order and rejects stale ids.
pub(crate) struct Callbacks(RefCell<CallbackTable>);

struct CallbackTable {
    entries: SlabMap<(u64, Callback)>,
    next_seq: u64,
}

impl Callbacks {
    pub fn new() -> Self {
        Self(RefCell::new(CallbackTable {
            entries: SlabMap::new(),
            next_seq: 0,
        }))
    }
    pub fn insert(&self, callback: Callback) -> CallbackId {
        let mut table = self.0.borrow_mut();
        let seq = table.next_seq;
        table.next_seq += 1;
        let key = table.entries.insert((seq, callback));
        CallbackId { key, seq }
    }
    pub fn remove(&self, id: CallbackId) -> bool {
        let mut table = self.0.borrow_mut();
        match table.entries.get(id.key) {
            Some((seq, _)) if *seq == id.seq => {
                table.entries.remove(id.key);
                true
            }
            _ => false,
        }
    }
    pub fn len(&self) -> usize {
        self.0.borrow().entries.len()
    }

    /// Callbacks in registration order.
    ///
    /// The table is not borrowed while the returned callbacks run, so they may
    /// register or remove callbacks on the same node.
    pub fn snapshot(&self) -> Vec<Callback> {
        let table = self.0.borrow();
        let mut items: Vec<_> = table
            .entries
            .values()
            .map(|(seq, cb)| (*seq, cb.clone()))
            .collect();
        items.sort_by_key(|(seq, _)| *seq);
        items.into_iter().map(|(_, cb)| cb).collect()
    }
    pub fn emit(&self, state: &AnyState) {
        for callback in self.snapshot() {
            callback(state);
        }
    }
}

/// Notification machinery shared by every kind of state.
///
/// Holds the callback registry, the batching and suppression counters and the
/// link to the owning parent.
pub struct StateBase {
    this: Weak<dyn RawState>,
    callbacks: Callbacks,
    parent: RefCell<Option<Weak<dyn RawState>>>,
    enabled: Cell<bool>,
    batch_depth: Cell<usize>,
    pending: Cell<bool>,
}

impl StateBase {
    pub(crate) fn new(this: Weak<dyn RawState>) -> Self {
        Self {
            this,
            callbacks: Callbacks::new(),
            parent: RefCell::new(None),
            enabled: Cell::new(true),
            batch_depth: Cell::new(0),
            pending: Cell::new(false),
        }
    }

    pub(crate) fn this(&self) -> Option<AnyState> {
        self.this.upgrade().map(AnyState)
    }
    pub(crate) fn weak(&self) -> Weak<dyn RawState> {
        self.this.clone()
    }

    /// Appends `callback`. If `fire_immediately` is set, it is invoked once right away.
    pub fn register(
        &self,
        callback: impl Fn(&AnyState) + 'static,
        fire_immediately: bool,
    ) -> CallbackId {
        let callback: Callback = Rc::new(callback);
        let id = self.callbacks.insert(callback.clone());
        if fire_immediately {
            if let Some(this) = self.this() {
                callback(&this);
            }
        }
        id
    }
    pub fn unregister(&self, id: CallbackId) -> Result<(), StateError> {
        if self.callbacks.remove(id) {
            Ok(())
        } else {
            Err(StateError::CallbackNotFound)
        }
    }
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Invokes every callback in registration order, unless notifications are
    /// disabled or a batch is open, in which case the notification is deferred.
    pub fn notify(&self) {
        if !self.enabled.get() {
            return;
        }
        if self.batch_depth.get() > 0 {
            self.pending.set(true);
            return;
        }
        if let Some(this) = self.this() {
            self.callbacks.emit(&this);
        }
    }

    pub fn enter_batch(&self) {
        self.batch_depth.set(self.batch_depth.get() + 1);
    }

    /// Closes a batch. Closing the outermost batch always emits exactly one notification.
    pub fn exit_batch(&self) {
        let Some(depth) = self.batch_depth.get().checked_sub(1) else {
            tracing::warn!("`exit_batch` called without a matching `enter_batch`");
            return;
        };
        self.batch_depth.set(depth);
        if depth == 0 {
            self.pending.set(false);
            self.notify();
        }
    }

    /// Opens a batch that is closed when the returned guard is dropped.
    pub fn batch(&self) -> BatchGuard<'_> {
        self.enter_batch();
        BatchGuard(self)
    }
    pub fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }
    pub fn has_pending(&self) -> bool {
        self.pending.get()
    }

    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }
    pub fn notifications_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Disables notifications until the returned guard is dropped.
    pub fn silence(&self) -> SilenceGuard<'_> {
        let restore = self.enabled.replace(false);
        SilenceGuard {
            base: self,
            restore,
        }
    }

    pub fn parent(&self) -> Option<AnyState> {
        self.parent
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(AnyState)
    }
    pub(crate) fn attach(&self, parent: Weak<dyn RawState>) -> Result<(), StateError> {
        let mut current = self.parent.borrow_mut();
        if current.as_ref().is_some_and(|p| p.strong_count() > 0) {
            return Err(StateError::AlreadyAttached);
        }
        *current = Some(parent);
        Ok(())
    }
    pub(crate) fn detach(&self) {
        self.parent.borrow_mut().take();
    }
}

#[must_use]
pub struct BatchGuard<'a>(&'a StateBase);

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.exit_batch();
    }
}

#[must_use]
pub struct SilenceGuard<'a> {
    base: &'a StateBase,
    restore: bool,
}

impl Drop for SilenceGuard<'_> {
    fn drop(&mut self) {
        self.base.enabled.set(self.restore);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Shape {
    Leaf,
    Composite,
    Sequence,
}

pub(crate) trait RawState: Any {
    fn base(&self) -> &StateBase;
    fn kind(&self) -> &str;
    fn shape(&self) -> Shape;
    fn serialize(&self) -> Result<Value, StateError>;
    fn deserialize(&self, value: &Value) -> Result<(), StateError>;
    fn copy_from(&self, other: &AnyState) -> Result<(), StateError>;

    /// Like `copy_from`, but `fresh` is discarded afterwards, so its children
    /// may be moved into this node.
    fn absorb(&self, fresh: &AnyState) -> Result<(), StateError> {
        self.copy_from(fresh)
    }
    fn fmt_state(&self, f: &mut fmt::Formatter, indent: usize) -> fmt::Result;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// Type-erased handle to any state.
///
/// Equality is identity: two handles are equal when they refer to the same node.
#[derive(Clone)]
pub struct AnyState(pub(crate) Rc<dyn RawState>);

impl AnyState {
    pub fn downcast<S: FromState>(&self) -> Option<S> {
        S::from_state(self)
    }
    pub fn is<S: FromState>(&self) -> bool {
        self.downcast::<S>().is_some()
    }
    pub fn is_leaf(&self) -> bool {
        self.0.shape() == Shape::Leaf
    }
    pub(crate) fn shape(&self) -> Shape {
        self.0.shape()
    }
    pub(crate) fn downcast_node<T: Any>(&self) -> Option<Rc<T>> {
        self.0.clone().into_any().downcast::<T>().ok()
    }
    fn addr(&self) -> *const () {
        Rc::as_ptr(&self.0).cast::<()>()
    }
}
impl PartialEq for AnyState {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}
impl Eq for AnyState {}

/// Conversion from a type-erased [`AnyState`] back to a concrete handle.
pub trait FromState: Sized {
    fn from_state(state: &AnyState) -> Option<Self>;
}
impl FromState for AnyState {
    fn from_state(state: &AnyState) -> Option<Self> {
        Some(state.clone())
    }
}

/// Operations common to every state handle.
pub trait Observable {
    fn base(&self) -> &StateBase;
    fn to_state(&self) -> AnyState;

    /// Registers a callback invoked with the changed state.
    fn on_change(&self, callback: impl Fn(&AnyState) + 'static) -> CallbackId {
        self.base().register(callback, false)
    }
    /// Registers a callback and invokes it once immediately.
    fn on_change_now(&self, callback: impl Fn(&AnyState) + 'static) -> CallbackId {
        self.base().register(callback, true)
    }
    fn remove_callback(&self, id: CallbackId) -> Result<(), StateError> {
        self.base().unregister(id)
    }
    /// Registers a callback that stays registered while the returned [`Subscription`] is alive.
    fn subscribe(&self, callback: impl Fn(&AnyState) + 'static) -> Subscription {
        let id = self.on_change(callback);
        let node = Rc::downgrade(&self.to_state().0);
        Subscription::from_fn(move || {
            if let Some(node) = node.upgrade() {
                node.base().callbacks.remove(id);
            }
        })
    }

    fn notify(&self) {
        self.base().notify()
    }
    /// Defers notifications until the returned guard is dropped, then notifies once.
    fn batch(&self) -> BatchGuard<'_> {
        self.base().batch()
    }
    fn set_notifications_enabled(&self, enabled: bool) {
        self.base().set_notifications_enabled(enabled)
    }
    fn parent(&self) -> Option<AnyState> {
        self.base().parent()
    }

    /// Name of the concrete kind, such as `IntState` or the kind given to a composite.
    fn kind_name(&self) -> String {
        self.to_state().0.kind().to_string()
    }
    fn serialize(&self) -> Result<Value, StateError> {
        self.to_state().0.serialize()
    }
    fn deserialize(&self, value: &Value) -> Result<(), StateError> {
        self.to_state().0.deserialize(value)
    }
    /// Copies the values of `other` into this state without replacing any node.
    fn copy_from(&self, other: &impl Observable) -> Result<(), StateError> {
        self.to_state().0.copy_from(&other.to_state())
    }
    fn same_state(&self, other: &impl Observable) -> bool {
        self.to_state() == other.to_state()
    }
    fn to_display_string(&self, indent: usize) -> String {
        crate::fmt::display_string(&self.to_state(), indent)
    }
}

impl Observable for AnyState {
    fn base(&self) -> &StateBase {
        self.0.base()
    }
    fn to_state(&self) -> AnyState {
        self.clone()
    }
}
