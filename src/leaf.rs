use std::{
    any::{type_name, Any},
    cell::RefCell,
    fmt,
    rc::Rc,
};

use derive_ex::derive_ex;

use crate::{
    node::{RawState, Shape, StateBase},
    AnyState, FromState, Observable, SequenceState, StateError, Value,
};

mod kinds;

pub use kinds::LeafKinds;

#[cfg(test)]
mod tests;

/// A value that can be held by a [`LeafState`].
pub trait LeafValue: Clone + 'static {
    /// Name of the leaf kind, used for display and error messages.
    const KIND: &'static str;

    /// Whether assigning an equal value is suppressed by default.
    const VERIFY_CHANGE: bool = true;

    fn same(&self, other: &Self) -> bool;
    fn to_value(&self) -> Result<Value, StateError>;
    fn from_value(value: &Value) -> Result<Self, StateError>;
    fn fmt_value(&self, f: &mut fmt::Formatter) -> fmt::Result;
}

impl LeafValue for i64 {
    const KIND: &'static str = "IntState";
    fn same(&self, other: &Self) -> bool {
        self == other
    }
    fn to_value(&self) -> Result<Value, StateError> {
        Ok(Value::from(*self))
    }
    fn from_value(value: &Value) -> Result<Self, StateError> {
        value
            .as_i64()
            .ok_or_else(|| StateError::schema("integer", value))
    }
    fn fmt_value(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl LeafValue for f64 {
    const KIND: &'static str = "FloatState";
    fn same(&self, other: &Self) -> bool {
        self == other
    }
    /// Infinities and NaN have no serialized form.
    fn to_value(&self) -> Result<Value, StateError> {
        if self.is_finite() {
            Ok(Value::from(*self))
        } else {
            Err(StateError::NonFiniteFloat(self.to_string()))
        }
    }
    fn from_value(value: &Value) -> Result<Self, StateError> {
        value
            .as_f64()
            .ok_or_else(|| StateError::schema("number", value))
    }
    fn fmt_value(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl LeafValue for String {
    const KIND: &'static str = "StringState";
    fn same(&self, other: &Self) -> bool {
        self == other
    }
    fn to_value(&self) -> Result<Value, StateError> {
        Ok(Value::from(self.as_str()))
    }
    fn from_value(value: &Value) -> Result<Self, StateError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| StateError::schema("string", value))
    }
    fn fmt_value(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl LeafValue for bool {
    const KIND: &'static str = "BoolState";
    fn same(&self, other: &Self) -> bool {
        self == other
    }
    fn to_value(&self) -> Result<Value, StateError> {
        Ok(Value::from(*self))
    }
    fn from_value(value: &Value) -> Result<Self, StateError> {
        value
            .as_bool()
            .ok_or_else(|| StateError::schema("bool", value))
    }
    fn fmt_value(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// An opaque value held by an [`ObjectState`].
///
/// Objects are never compared, so every assignment notifies, and they cannot be serialized.
#[derive(Clone)]
pub struct Object {
    value: Rc<dyn Any>,
    type_name: &'static str,
}

impl Object {
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            value: Rc::new(value),
            type_name: type_name::<T>(),
        }
    }
    pub(crate) fn from_boxed(value: Box<dyn Any>, type_name: &'static str) -> Self {
        Self {
            value: Rc::from(value),
            type_name,
        }
    }
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}
impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.type_name)
    }
}

impl LeafValue for Object {
    const KIND: &'static str = "ObjectState";
    const VERIFY_CHANGE: bool = false;
    fn same(&self, _other: &Self) -> bool {
        false
    }
    fn to_value(&self) -> Result<Value, StateError> {
        Err(StateError::UnserializableKind(Self::KIND.to_string()))
    }
    fn from_value(_value: &Value) -> Result<Self, StateError> {
        Err(StateError::UnserializableKind(Self::KIND.to_string()))
    }
    fn fmt_value(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type IntState = LeafState<i64>;
pub type FloatState = LeafState<f64>;
pub type StringState = LeafState<String>;
pub type BoolState = LeafState<bool>;
pub type ObjectState = LeafState<Object>;

/// A state holding a single value.
///
/// Assigning a value notifies the callbacks. With change verification enabled
/// (the default for every kind except [`ObjectState`]), assigning a value equal
/// to the current one does nothing.
#[derive_ex(Clone, bound())]
pub struct LeafState<T: LeafValue>(Rc<LeafNode<T>>);

type Quantizer<T> = Box<dyn Fn(T) -> T>;

struct LeafNode<T: LeafValue> {
    base: StateBase,
    value: RefCell<T>,
    verify_change: bool,
    quantize: Option<Quantizer<T>>,
}

impl<T: LeafValue> LeafState<T> {
    pub fn new(value: T) -> Self {
        Self::from_parts(value, T::VERIFY_CHANGE, None)
    }

    /// Creates a leaf that notifies on every assignment, even of an equal value.
    pub fn always_notify(value: T) -> Self {
        Self::from_parts(value, false, None)
    }

    /// Creates a leaf that passes every assigned value through `quantize` before
    /// comparing and storing it.
    pub fn with_quantizer(value: T, quantize: impl Fn(T) -> T + 'static) -> Self {
        Self::from_parts(value, T::VERIFY_CHANGE, Some(Box::new(quantize)))
    }

    fn from_parts(value: T, verify_change: bool, quantize: Option<Quantizer<T>>) -> Self {
        let value = match &quantize {
            Some(quantize) => quantize(value),
            None => value,
        };
        Self(Rc::<LeafNode<T>>::new_cyclic(|this| LeafNode {
            base: StateBase::new(this.clone()),
            value: RefCell::new(value),
            verify_change,
            quantize,
        }))
    }

    pub fn get(&self) -> T {
        self.0.value.borrow().clone()
    }
    pub fn with<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        f(&self.0.value.borrow())
    }
    pub fn set(&self, value: T) {
        self.0.assign(value)
    }
    pub fn verifies_change(&self) -> bool {
        self.0.verify_change
    }

    /// Creates a leaf computed from this one by `f` and keeps it up to date.
    pub fn derive_with<U: LeafValue>(
        &self,
        f: impl Fn(&LeafState<T>) -> LeafState<U> + 'static,
    ) -> LeafState<U> {
        let derived = f(self);
        let target = derived.clone();
        self.on_change(move |state| {
            if let Some(source) = state.downcast::<LeafState<T>>() {
                target.set(f(&source).get());
            }
        });
        derived
    }

    /// Keeps this leaf equal to `compute()`, recomputing whenever one of `states` changes.
    ///
    /// With `element_wise`, sequences among `states` also trigger on changes of their elements.
    pub fn depends_on(
        &self,
        states: impl IntoIterator<Item = AnyState>,
        element_wise: bool,
        compute: impl Fn() -> T + 'static,
    ) {
        let this = Rc::downgrade(&self.0);
        let update: Rc<dyn Fn()> = Rc::new(move || {
            if let Some(node) = this.upgrade() {
                node.assign(compute());
            }
        });
        for state in states {
            if element_wise {
                if let Some(sequence) = state.downcast::<SequenceState>() {
                    let update = update.clone();
                    sequence.on_element_change(move |_| update());
                }
            }
            let update = update.clone();
            state.on_change(move |_| update());
        }
        update();
    }
}

impl LeafState<Object> {
    pub fn wrap<V: Any>(value: V) -> Self {
        Self::new(Object::new(value))
    }
}

impl LeafState<f64> {
    /// Creates a float leaf rounding every assigned value to `precision` decimal digits.
    ///
    /// Rounding happens before the equality check, so values differing only
    /// below the precision do not notify.
    pub fn with_precision(value: f64, precision: u32) -> Self {
        Self::with_quantizer(value, move |v| round_to(v, precision))
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    let scaled = (value * scale).round();
    if scaled.is_finite() {
        scaled / scale
    } else {
        value
    }
}

impl<T: LeafValue> LeafNode<T> {
    fn assign(&self, value: T) {
        let value = match &self.quantize {
            Some(quantize) => quantize(value),
            None => value,
        };
        if self.verify_change && self.value.borrow().same(&value) {
            return;
        }
        *self.value.borrow_mut() = value;
        self.base.notify();
    }
}

impl<T: LeafValue> RawState for LeafNode<T> {
    fn base(&self) -> &StateBase {
        &self.base
    }
    fn kind(&self) -> &str {
        T::KIND
    }
    fn shape(&self) -> Shape {
        Shape::Leaf
    }
    fn serialize(&self) -> Result<Value, StateError> {
        self.value.borrow().to_value()
    }
    fn deserialize(&self, value: &Value) -> Result<(), StateError> {
        let value = T::from_value(value)?;
        self.assign(value);
        Ok(())
    }
    fn copy_from(&self, other: &AnyState) -> Result<(), StateError> {
        let Some(other) = other.downcast::<LeafState<T>>() else {
            return Err(StateError::TypeMismatch {
                expected: T::KIND.to_string(),
                found: other.kind_name(),
            });
        };
        let value = other.get();
        self.assign(value);
        Ok(())
    }
    fn fmt_state(&self, f: &mut fmt::Formatter, _indent: usize) -> fmt::Result {
        write!(f, "{}[value=", T::KIND)?;
        self.value.borrow().fmt_value(f)?;
        write!(f, "]")
    }
    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl<T: LeafValue> Observable for LeafState<T> {
    fn base(&self) -> &StateBase {
        &self.0.base
    }
    fn to_state(&self) -> AnyState {
        self.clone().into()
    }
}
impl<T: LeafValue> From<LeafState<T>> for AnyState {
    fn from(value: LeafState<T>) -> Self {
        AnyState(value.0)
    }
}
impl<T: LeafValue> FromState for LeafState<T> {
    fn from_state(state: &AnyState) -> Option<Self> {
        state.downcast_node::<LeafNode<T>>().map(LeafState)
    }
}
