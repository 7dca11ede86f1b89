use std::{cell::Cell, rc::Rc};

use assert_call::call;

use crate::Observable;

/// Number of notifications received by a state since [`count_notifications`] was called.
pub struct Counter(Rc<Cell<usize>>);

impl Counter {
    pub fn count(&self) -> usize {
        self.0.get()
    }
}

pub fn count_notifications(state: &impl Observable) -> Counter {
    let count = Rc::new(Cell::new(0));
    let c = count.clone();
    state.on_change(move |_| c.set(c.get() + 1));
    Counter(count)
}

/// Records `call!(name)` on every notification of `state`.
pub fn record(state: &impl Observable, name: &'static str) {
    state.on_change(move |_| call!("{}", name));
}
