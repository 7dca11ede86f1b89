use std::{any::Any, cell::RefCell, cmp::Ordering, fmt, mem::take, rc::Rc};

use derive_ex::Ex;

use crate::{
    node::{CallbackId, Callbacks, RawState, Shape, StateBase},
    AnyState, FromState, Observable, StateError, Value,
};


type ElementFactory = Rc<dyn Fn(&Value) -> Result<AnyState, StateError>>;

/// An ordered, mutable collection of states.
///
/// Two channels report changes:
///
/// - the aggregate channel ([`Observable::on_change`]) fires once per structural
///   mutation (insertion, removal, reordering);
/// - the element channel ([`SequenceState::on_element_change`]) fires when the
///   value of a contained element changes.
#[derive(Ex)]
#[derive_ex(Clone, Default)]
#[default(Self::new())]
pub struct SequenceState(Rc<SequenceNode>);

struct SequenceNode {
    base: StateBase,
    elements: RefCell<Vec<Element>>,
    element_callbacks: Callbacks,
    factory: Option<ElementFactory>,
}

struct Element {
    state: AnyState,
    forward: CallbackId,
}

impl SequenceState {
    pub fn new() -> Self {
        Self::from_parts(None)
    }

    /// Creates a sequence able to deserialize its elements with `factory`.
    pub fn with_factory(
        factory: impl Fn(&Value) -> Result<AnyState, StateError> + 'static,
    ) -> Self {
        Self::from_parts(Some(Rc::new(factory)))
    }

    /// Creates a sequence holding `states`.
    pub fn from_states(
        states: impl IntoIterator<Item = impl Into<AnyState>>,
    ) -> Result<Self, StateError> {
        let this = Self::new();
        this.extend(states)?;
        Ok(this)
    }

    fn from_parts(factory: Option<ElementFactory>) -> Self {
        Self(Rc::<SequenceNode>::new_cyclic(|this| SequenceNode {
            base: StateBase::new(this.clone()),
            elements: RefCell::new(Vec::new()),
            element_callbacks: Callbacks::new(),
            factory,
        }))
    }

    /// Registers a callback on the element channel. It receives the sequence.
    pub fn on_element_change(&self, callback: impl Fn(&AnyState) + 'static) -> CallbackId {
        self.0.element_callbacks.insert(Rc::new(callback))
    }
    pub fn remove_element_callback(&self, id: CallbackId) -> Result<(), StateError> {
        if self.0.element_callbacks.remove(id) {
            Ok(())
        } else {
            Err(StateError::CallbackNotFound)
        }
    }

    pub fn len(&self) -> usize {
        self.0.elements.borrow().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn get(&self, index: usize) -> Option<AnyState> {
        self.0.elements.borrow().get(index).map(|e| e.state.clone())
    }
    pub fn index_of(&self, state: &impl Observable) -> Option<usize> {
        let state = state.to_state();
        self.0.elements.borrow().iter().position(|e| e.state == state)
    }
    pub fn contains(&self, state: &impl Observable) -> bool {
        self.index_of(state).is_some()
    }
    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<AnyState> {
        self.0
            .elements
            .borrow()
            .iter()
            .map(|e| e.state.clone())
            .collect()
    }
    pub fn iter(&self) -> std::vec::IntoIter<AnyState> {
        self.to_vec().into_iter()
    }

    pub fn push(&self, state: impl Into<AnyState>) -> Result<(), StateError> {
        let index = self.len();
        self.insert(index, state)
    }

    /// Appends every state of `states`, notifying once.
    pub fn extend(
        &self,
        states: impl IntoIterator<Item = impl Into<AnyState>>,
    ) -> Result<(), StateError> {
        let _batch = self.0.base.batch();
        for state in states {
            self.push(state)?;
        }
        Ok(())
    }

    pub fn insert(&self, index: usize, state: impl Into<AnyState>) -> Result<(), StateError> {
        let len = self.len();
        if index > len {
            return Err(StateError::IndexOutOfBounds { index, len });
        }
        let element = self.0.adopt(state.into())?;
        self.0.elements.borrow_mut().insert(index, element);
        self.0.base.notify();
        Ok(())
    }

    pub fn remove(&self, state: &impl Observable) -> Result<(), StateError> {
        let index = self.index_of(state).ok_or(StateError::ElementNotFound)?;
        self.pop_at(index).map(|_| ())
    }

    pub fn pop(&self) -> Option<AnyState> {
        let index = self.len().checked_sub(1)?;
        self.pop_at(index).ok()
    }
    pub fn pop_at(&self, index: usize) -> Result<AnyState, StateError> {
        let element = {
            let mut elements = self.0.elements.borrow_mut();
            let len = elements.len();
            if index >= len {
                return Err(StateError::IndexOutOfBounds { index, len });
            }
            elements.remove(index)
        };
        let state = release(element);
        self.0.base.notify();
        Ok(state)
    }

    pub fn clear(&self) {
        let elements = take(&mut *self.0.elements.borrow_mut());
        for element in elements {
            release(element);
        }
        self.0.base.notify();
    }

    pub fn reverse(&self) {
        self.0.elements.borrow_mut().reverse();
        self.0.base.notify();
    }

    pub fn sort_by(&self, mut compare: impl FnMut(&AnyState, &AnyState) -> Ordering) {
        let mut elements = take(&mut *self.0.elements.borrow_mut());
        elements.sort_by(|a, b| compare(&a.state, &b.state));
        *self.0.elements.borrow_mut() = elements;
        self.0.base.notify();
    }
    pub fn sort_by_key<K: Ord>(&self, mut key: impl FnMut(&AnyState) -> K) {
        self.sort_by(|a, b| key(a).cmp(&key(b)))
    }
}

fn release(element: Element) -> AnyState {
    let base = element.state.base();
    let _ = base.unregister(element.forward);
    base.detach();
    element.state
}

impl SequenceNode {
    fn adopt(self: &Rc<Self>, state: AnyState) -> Result<Element, StateError> {
        state.base().attach(self.base.weak())?;
        let this = Rc::downgrade(self);
        let forward = state.base().register(
            move |_| {
                if let Some(node) = this.upgrade() {
                    node.element_changed();
                }
            },
            false,
        );
        Ok(Element { state, forward })
    }
    fn element_changed(&self) {
        if !self.base.notifications_enabled() {
            return;
        }
        if let Some(this) = self.base.this() {
            self.element_callbacks.emit(&this);
        }
    }
    /// Empties the sequence without notifying, handing back the released elements.
    fn release_all(&self) -> Vec<AnyState> {
        let elements = take(&mut *self.elements.borrow_mut());
        elements.into_iter().map(release).collect()
    }
    fn snapshot(&self) -> Vec<AnyState> {
        self.elements
            .borrow()
            .iter()
            .map(|e| e.state.clone())
            .collect()
    }
}

impl Drop for SequenceNode {
    fn drop(&mut self) {
        for element in take(self.elements.get_mut()) {
            release(element);
        }
    }
}

impl RawState for SequenceNode {
    fn base(&self) -> &StateBase {
        &self.base
    }
    fn kind(&self) -> &str {
        "SequenceState"
    }
    fn shape(&self) -> Shape {
        Shape::Sequence
    }
    fn serialize(&self) -> Result<Value, StateError> {
        self.snapshot()
            .iter()
            .map(|state| state.0.serialize())
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    /// Replaces every element by one built with the element factory.
    fn deserialize(&self, value: &Value) -> Result<(), StateError> {
        let Value::Array(values) = value else {
            return Err(StateError::schema("list", value));
        };
        let Some(factory) = self.factory.clone() else {
            return Err(StateError::UnsupportedOperation(
                "deserializing a sequence without an element factory",
            ));
        };
        let states = values
            .iter()
            .map(|value| factory(value))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(this) = self.base.this().and_then(|s| s.downcast::<SequenceState>()) else {
            return Ok(());
        };
        let _batch = self.base.batch();
        this.clear();
        this.extend(states)
    }

    fn copy_from(&self, other: &AnyState) -> Result<(), StateError> {
        let other_elements = match other.downcast::<SequenceState>() {
            Some(other) if other.len() == self.elements.borrow().len() => other.to_vec(),
            _ => {
                return Err(StateError::TypeMismatch {
                    expected: self.kind().to_string(),
                    found: other.kind_name(),
                })
            }
        };
        for (target, source) in self.snapshot().iter().zip(&other_elements) {
            target.0.copy_from(source)?;
        }
        Ok(())
    }

    /// Copies the common prefix in place, then drops surplus elements or moves
    /// the remaining elements of `fresh` over.
    fn absorb(&self, fresh: &AnyState) -> Result<(), StateError> {
        let (Some(fresh), Some(this)) = (
            fresh.downcast::<SequenceState>(),
            self.base.this().and_then(|s| s.downcast::<SequenceState>()),
        ) else {
            return self.copy_from(fresh);
        };
        if Rc::ptr_eq(&this.0, &fresh.0) {
            return Ok(());
        }
        let mut sources = fresh.0.release_all();
        let targets = self.snapshot();
        if sources.len() == targets.len() {
            for (target, source) in targets.iter().zip(&sources) {
                target.0.absorb(source)?;
            }
            return Ok(());
        }
        let _batch = self.base.batch();
        let tail = sources.split_off(targets.len().min(sources.len()));
        for (target, source) in targets.iter().zip(&sources) {
            target.0.absorb(source)?;
        }
        while this.len() > sources.len() + tail.len() {
            this.pop();
        }
        this.extend(tail)
    }

    fn fmt_state(&self, f: &mut fmt::Formatter, indent: usize) -> fmt::Result {
        crate::fmt::fmt_sequence(self.kind(), &self.snapshot(), f, indent)
    }
    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl Observable for SequenceState {
    fn base(&self) -> &StateBase {
        &self.0.base
    }
    fn to_state(&self) -> AnyState {
        self.clone().into()
    }
}
impl From<SequenceState> for AnyState {
    fn from(value: SequenceState) -> Self {
        AnyState(value.0)
    }
}
impl FromState for SequenceState {
    fn from_state(state: &AnyState) -> Option<Self> {
        state.downcast_node::<SequenceNode>().map(SequenceState)
    }
}
