//! Conversion of state trees to and from plain [`Value`]s.
//!
//! A serialized tree contains only numbers, strings, booleans, lists and
//! string-keyed mappings. Mappings keep member order.

use serde::{ser::Error, Serialize, Serializer};

use crate::{
    node::RawState, AnyState, CompositeState, DictState, LeafState, LeafValue, Observable,
    SequenceState,
};

pub use serde_json::Value;

#[cfg(test)]
mod tests;

fn serialize_state<S: Serializer>(state: &AnyState, serializer: S) -> Result<S::Ok, S::Error> {
    match RawState::serialize(&*state.0) {
        Ok(value) => value.serialize(serializer),
        Err(e) => Err(S::Error::custom(e)),
    }
}

impl Serialize for AnyState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_state(self, serializer)
    }
}
impl<T: LeafValue> Serialize for LeafState<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_state(&self.to_state(), serializer)
    }
}
impl Serialize for CompositeState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_state(&self.to_state(), serializer)
    }
}
impl Serialize for SequenceState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_state(&self.to_state(), serializer)
    }
}
impl Serialize for DictState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_state(&self.to_state(), serializer)
    }
}

/// Parses `json` and deserializes it into `state`.
pub fn deserialize_json(state: &impl Observable, json: &str) -> Result<(), CodecError> {
    let value: Value = serde_json::from_str(json).map_err(CodecError::Json)?;
    state.deserialize(&value).map_err(CodecError::State)
}

/// Serializes `state` to a JSON string.
pub fn serialize_json(state: &impl Observable) -> Result<String, CodecError> {
    let value = state.serialize().map_err(CodecError::State)?;
    serde_json::to_string(&value).map_err(CodecError::Json)
}

#[derive(parse_display::Display, Debug)]
pub enum CodecError {
    #[display("{0}")]
    Json(serde_json::Error),
    #[display("{0}")]
    State(crate::StateError),
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Json(e) => Some(e),
            CodecError::State(e) => Some(e),
        }
    }
}
