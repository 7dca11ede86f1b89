use std::{any::Any, ops::Deref};

use crate::{node::StateBase, AnyState, CompositeState, Observable, StateError, Value};


/// A composite made only of leaves, accessible by position.
///
/// ```
/// use widget_state::{DictState, Observable};
///
/// let v = DictState::new("Vector", [("x", 10), ("y", 20), ("z", 30)]).unwrap();
/// v.set([1, 2, 3]).unwrap();
/// assert_eq!(v.serialize().unwrap(), serde_json::json!({"x": 1, "y": 2, "z": 3}));
/// ```
#[derive(Clone)]
pub struct DictState(CompositeState);

impl DictState {
    /// Creates a dict whose leaves are wrapped from `entries` by the standard leaf kinds.
    pub fn new<K: Into<String>, V: Any>(
        kind: impl Into<String>,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self, StateError> {
        let state = CompositeState::new(kind);
        for (label, value) in entries {
            state.set_value(&label.into(), value)?;
        }
        Ok(Self(state))
    }

    /// Uses `state` as a dict. Fails if a member of `state` is not a leaf.
    pub fn from_composite(state: CompositeState) -> Result<Self, StateError> {
        if let Some((name, member)) = state.members().into_iter().find(|(_, m)| !m.is_leaf()) {
            return Err(StateError::SchemaMismatch {
                expected: "leaf members",
                found: format!("`{name}` of kind `{}`", member.kind_name()),
            });
        }
        Ok(Self(state))
    }

    pub fn at(&self, index: usize) -> Option<AnyState> {
        self.0.members().into_iter().nth(index).map(|(_, s)| s)
    }
    pub fn states(&self) -> Vec<AnyState> {
        self.0.members().into_iter().map(|(_, s)| s).collect()
    }

    /// Serialized values of the leaves, in order.
    pub fn values(&self) -> Result<Vec<Value>, StateError> {
        self.states().iter().map(Observable::serialize).collect()
    }

    /// Assigns one value per leaf, in order, notifying once.
    pub fn set<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<(), StateError> {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let states = self.states();
        if values.len() != states.len() {
            return Err(StateError::SchemaMismatch {
                expected: "one value per member",
                found: format!("{} values for {} members", values.len(), states.len()),
            });
        }
        let _batch = self.0.batch();
        for (state, value) in states.iter().zip(&values) {
            state.deserialize(value)?;
        }
        Ok(())
    }

    pub fn as_composite(&self) -> &CompositeState {
        &self.0
    }
}

impl Deref for DictState {
    type Target = CompositeState;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Observable for DictState {
    fn base(&self) -> &StateBase {
        self.0.base()
    }
    fn to_state(&self) -> AnyState {
        self.0.to_state()
    }
}
impl From<DictState> for AnyState {
    fn from(value: DictState) -> Self {
        value.0.into()
    }
}
