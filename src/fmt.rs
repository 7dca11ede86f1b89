//! Human-readable rendering of state trees.
//!
//! ```text
//! [Widget]:
//!  - name: StringState[value="Higher"]
//!  - count: IntState[value=5]
//!  - internal[Inner]:
//!   - length: FloatState[value=3.141]
//! ```

use std::fmt;

use crate::{
    node::{RawState, Shape},
    AnyState, CompositeState, DictState, LeafState, LeafValue, Observable, SequenceState,
};


struct Indented<'a> {
    state: &'a dyn RawState,
    indent: usize,
}
impl fmt::Display for Indented<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.state.fmt_state(f, self.indent)
    }
}

pub(crate) fn display_string(state: &AnyState, indent: usize) -> String {
    Indented {
        state: &*state.0,
        indent,
    }
    .to_string()
}

pub(crate) fn fmt_composite(
    kind: &str,
    members: &[(String, AnyState)],
    f: &mut fmt::Formatter,
    indent: usize,
) -> fmt::Result {
    write!(f, "[{kind}]:")?;
    let padding = " ".repeat(indent);
    for (name, state) in members {
        write!(f, "\n{padding} - {name}")?;
        if state.shape() != Shape::Composite {
            write!(f, ": ")?;
        }
        state.0.fmt_state(f, indent + 1)?;
    }
    Ok(())
}

pub(crate) fn fmt_sequence(
    kind: &str,
    elements: &[AnyState],
    f: &mut fmt::Formatter,
    indent: usize,
) -> fmt::Result {
    write!(f, "{kind}[")?;
    for (index, state) in elements.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        state.0.fmt_state(f, indent + 1)?;
    }
    write!(f, "]")
}

macro_rules! impl_display {
    ($($ty:ty $(where $t:ident)?),* $(,)?) => {
        $(
            impl$(<$t: LeafValue>)? fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    self.to_state().0.fmt_state(f, 0)
                }
            }
            impl$(<$t: LeafValue>)? fmt::Debug for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    fmt::Display::fmt(self, f)
                }
            }
        )*
    };
}

impl_display!(
    AnyState,
    LeafState<T> where T,
    CompositeState,
    SequenceState,
    DictState,
);
