use std::rc::Rc;

use super::{short_type_name, CompositeNode};
use crate::{leaf::LeafValue, AnyState, FromState, LeafState, Observable, StateError};

pub(crate) type ComputeFn = Rc<dyn Fn(&Params) -> Result<AnyState, StateError>>;

pub(crate) struct ComputedSlot {
    name: String,
    params: Vec<String>,
    compute: ComputeFn,
    active: bool,
}

impl ComputedSlot {
    pub fn new(name: String, params: Vec<String>, compute: ComputeFn) -> Self {
        Self {
            name,
            params,
            compute,
            active: false,
        }
    }
}

/// Parameters passed to the function of a computed member, in declared order.
pub struct Params<'a> {
    names: &'a [String],
    states: &'a [AnyState],
}

impl<'a> Params<'a> {
    pub fn len(&self) -> usize {
        self.states.len()
    }
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&'a AnyState> {
        self.states.get(index)
    }
    pub fn by_name(&self, name: &str) -> Option<&'a AnyState> {
        let index = self.names.iter().position(|n| n == name)?;
        self.states.get(index)
    }

    /// Returns parameter `index` as a concrete handle.
    pub fn state<S: FromState>(&self, index: usize) -> Result<S, StateError> {
        let state = self.get(index).ok_or(StateError::IndexOutOfBounds {
            index,
            len: self.len(),
        })?;
        state.downcast().ok_or_else(|| StateError::TypeMismatch {
            expected: short_type_name::<S>().to_string(),
            found: state.kind_name(),
        })
    }

    /// Returns the current value of the leaf parameter `index`.
    pub fn value<T: LeafValue>(&self, index: usize) -> Result<T, StateError> {
        Ok(self.state::<LeafState<T>>(index)?.get())
    }
}

impl CompositeNode {
    pub(super) fn computed_index(&self, name: &str) -> Option<usize> {
        self.computed.borrow().iter().position(|c| c.name == name)
    }

    /// Active computed members having `name` among their parameters.
    pub(super) fn dependents(&self, name: &str) -> Vec<usize> {
        self.computed
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.active && c.params.iter().any(|p| p == name))
            .map(|(index, _)| index)
            .collect()
    }

    fn resolve(&self, params: &[String]) -> Option<Vec<AnyState>> {
        params.iter().map(|name| self.lookup(name)).collect()
    }

    /// Activates every computed member whose parameters are all bound.
    ///
    /// Activating a member binds it, which may complete the parameters of
    /// another one, so the scan repeats until nothing is ready.
    pub(super) fn activate_computed(self: &Rc<Self>) -> Result<(), StateError> {
        loop {
            let ready = {
                let computed = self.computed.borrow();
                computed
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| !c.active)
                    .find_map(|(index, c)| Some((index, self.resolve(&c.params)?)))
            };
            let Some((index, states)) = ready else {
                return Ok(());
            };
            let (name, params, compute) = {
                let mut computed = self.computed.borrow_mut();
                let slot = &mut computed[index];
                slot.active = true;
                (slot.name.clone(), slot.params.clone(), slot.compute.clone())
            };
            let result = compute(&Params {
                names: &params,
                states: &states,
            })
            .and_then(|state| self.attach(&name, state));
            if let Err(e) = result {
                self.computed.borrow_mut()[index].active = false;
                return Err(e);
            }
            tracing::trace!(kind = %self.kind, member = %name, "activated computed member");
        }
    }

    /// Recomputes an active computed member and moves the result into the bound node.
    pub(super) fn update_computed(&self, index: usize) -> Result<(), StateError> {
        let (name, params, compute) = {
            let computed = self.computed.borrow();
            let slot = &computed[index];
            (slot.name.clone(), slot.params.clone(), slot.compute.clone())
        };
        let missing = || StateError::UnknownMember(name.clone());
        let states = self.resolve(&params).ok_or_else(missing)?;
        let target = self.lookup(&name).ok_or_else(missing)?;
        let fresh = compute(&Params {
            names: &params,
            states: &states,
        })?;
        tracing::trace!(kind = %self.kind, member = %name, "recomputing computed member");
        target.0.absorb(&fresh)
    }

    /// Recomputes every active computed member in declaration order.
    pub(super) fn refresh_computed(&self) -> Result<(), StateError> {
        let active: Vec<usize> = self
            .computed
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.active)
            .map(|(index, _)| index)
            .collect();
        for index in active {
            self.update_computed(index)?;
        }
        Ok(())
    }
}
