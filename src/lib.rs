//! A tree of observable states for backing UI widgets.
//!
//! Leaves ([`LeafState`]) hold single values, composites ([`CompositeState`])
//! group named children and sequences ([`SequenceState`]) group ordered ones.
//! A change of any node is reported to its callbacks and forwarded up to the
//! root. Batches ([`Observable::batch`]) coalesce any number of changes into a
//! single notification.
//!
//! ```
//! use std::{cell::Cell, rc::Rc};
//! use widget_state::{CompositeState, FloatState, Observable};
//!
//! let sum = CompositeState::builder("Sum")
//!     .value("a", 0.5)
//!     .value("b", 2.0)
//!     .computed("sum", ["a", "b"], |p| {
//!         Ok(FloatState::new(p.value::<f64>(0)? + p.value::<f64>(1)?))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let count = Rc::new(Cell::new(0));
//! let c = count.clone();
//! sum.on_change(move |_| c.set(c.get() + 1));
//!
//! sum.get::<FloatState>("a").unwrap().set(1.0);
//! assert_eq!(sum.get::<FloatState>("sum").unwrap().get(), 3.0);
//! assert_eq!(count.get(), 1);
//! ```
//!
//! States are single-threaded: they are neither `Send` nor `Sync`.

mod codec;
mod collections;
mod composite;
mod error;
mod fmt;
mod leaf;
mod node;
mod subscription;

#[cfg(test)]
mod test_helpers;

pub use codec::{deserialize_json, serialize_json, CodecError, Value};
pub use collections::{DictState, SequenceState};
pub use composite::{CompositeBuilder, CompositeState, Params};
pub use error::StateError;
pub use leaf::{
    BoolState, FloatState, IntState, LeafKinds, LeafState, LeafValue, Object, ObjectState,
    StringState,
};
pub use node::{
    AnyState, BatchGuard, CallbackId, FromState, Observable, SilenceGuard, StateBase,
};
pub use subscription::Subscription;
