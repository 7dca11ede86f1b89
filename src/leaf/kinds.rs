use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    rc::Rc,
};

use super::{BoolState, FloatState, IntState, Object, ObjectState, StringState};
use crate::AnyState;

type Wrap = Box<dyn Fn(Box<dyn Any>) -> AnyState>;

thread_local! {
    static STANDARD: Rc<LeafKinds> = Rc::new(LeafKinds::standard());
}

/// Maps the type of a plain value to the leaf kind it is wrapped into when
/// assigned to a composite.
///
/// Types without an entry are wrapped into an [`ObjectState`].
pub struct LeafKinds {
    kinds: HashMap<TypeId, Wrap>,
}

impl LeafKinds {
    /// An empty registry: every value becomes an [`ObjectState`].
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Integers, floats, strings and booleans. Also returned by [`Default`].
    pub fn standard() -> Self {
        let mut kinds = Self::empty();
        kinds.register(|v: i64| IntState::new(v).into());
        kinds.register(|v: i8| IntState::new(v.into()).into());
        kinds.register(|v: i16| IntState::new(v.into()).into());
        kinds.register(|v: i32| IntState::new(v.into()).into());
        kinds.register(|v: u8| IntState::new(v.into()).into());
        kinds.register(|v: u16| IntState::new(v.into()).into());
        kinds.register(|v: u32| IntState::new(v.into()).into());
        kinds.register(checked_int::<isize>);
        kinds.register(checked_int::<u64>);
        kinds.register(checked_int::<usize>);
        kinds.register(|v: f64| FloatState::new(v).into());
        kinds.register(|v: f32| FloatState::new(v.into()).into());
        kinds.register(|v: String| StringState::new(v).into());
        kinds.register(|v: &'static str| StringState::new(v.to_string()).into());
        kinds.register(|v: bool| BoolState::new(v).into());
        kinds
    }

    /// The shared standard registry of the current thread.
    pub(crate) fn shared() -> Rc<Self> {
        STANDARD.with(Rc::clone)
    }

    /// Registers (or replaces) the leaf kind used for values of type `T`.
    pub fn register<T: Any>(&mut self, wrap: impl Fn(T) -> AnyState + 'static) {
        self.kinds.insert(
            TypeId::of::<T>(),
            Box::new(move |value| match value.downcast::<T>() {
                Ok(value) => wrap(*value),
                Err(value) => ObjectState::new(Object::from_boxed(value, type_name::<T>())).into(),
            }),
        );
    }
    pub fn contains<T: Any>(&self) -> bool {
        self.kinds.contains_key(&TypeId::of::<T>())
    }

    pub fn wrap<T: Any>(&self, value: T) -> AnyState {
        self.wrap_boxed(Box::new(value), type_name::<T>())
    }
    pub(crate) fn wrap_boxed(&self, value: Box<dyn Any>, type_name: &'static str) -> AnyState {
        match self.kinds.get(&(*value).type_id()) {
            Some(wrap) => wrap(value),
            None => ObjectState::new(Object::from_boxed(value, type_name)).into(),
        }
    }
}

/// Wraps `value` into an [`IntState`], or into an [`ObjectState`] if it does not fit in `i64`.
fn checked_int<T: Any + Copy + std::fmt::Display>(value: T) -> AnyState
where
    i64: TryFrom<T>,
{
    match i64::try_from(value) {
        Ok(v) => IntState::new(v).into(),
        Err(_) => {
            tracing::warn!(%value, "integer out of range for `IntState`, wrapping as an object");
            ObjectState::wrap(value).into()
        }
    }
}

impl Default for LeafKinds {
    fn default() -> Self {
        Self::standard()
    }
}
