use std::{
    any::{type_name, Any},
    cell::RefCell,
    fmt,
    mem::take,
    rc::Rc,
};

use serde_json::Map;

use crate::{
    leaf::LeafKinds,
    node::{CallbackId, RawState, Shape, StateBase},
    AnyState, FromState, Observable, StateError, Value,
};

mod computed;

use computed::{ComputeFn, ComputedSlot};
pub use computed::Params;


/// A state grouping named child states.
///
/// Every change of a child is forwarded as a change of the composite. Once a
/// name is bound, it keeps referring to the same node; only the node's value
/// may change.
///
/// Computed members are declared on the [`CompositeBuilder`]. A computed member
/// is created as soon as all of its parameters are bound and is recomputed in
/// place whenever one of them changes.
#[derive(Clone)]
pub struct CompositeState(Rc<CompositeNode>);

pub(crate) struct CompositeNode {
    base: StateBase,
    kind: String,
    members: RefCell<Vec<Member>>,
    computed: RefCell<Vec<ComputedSlot>>,
    leaf_kinds: Rc<LeafKinds>,
}

struct Member {
    name: String,
    state: AnyState,
    forward: CallbackId,
}

impl CompositeState {
    /// Creates an empty composite of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self::from_parts(kind.into(), Vec::new(), LeafKinds::shared())
    }
    pub fn builder(kind: impl Into<String>) -> CompositeBuilder {
        CompositeBuilder {
            kind: kind.into(),
            leaf_kinds: None,
            members: Vec::new(),
            computed: Vec::new(),
        }
    }
    fn from_parts(kind: String, computed: Vec<ComputedSlot>, leaf_kinds: Rc<LeafKinds>) -> Self {
        Self(Rc::<CompositeNode>::new_cyclic(|this| CompositeNode {
            base: StateBase::new(this.clone()),
            kind,
            members: RefCell::new(Vec::new()),
            computed: RefCell::new(computed),
            leaf_kinds,
        }))
    }

    /// Binds `name` to `state`.
    ///
    /// Binding the same node again is a no-op. Binding a different node to a
    /// bound name fails with [`StateError::IllegalRebind`].
    pub fn set_member(&self, name: &str, state: impl Into<AnyState>) -> Result<(), StateError> {
        self.0.bind(name, state.into())
    }

    /// Wraps `value` into a leaf using the leaf-kind registry and binds it to `name`.
    pub fn set_value<V: Any>(&self, name: &str, value: V) -> Result<(), StateError> {
        let state = self.0.leaf_kinds.wrap(value);
        self.0.bind(name, state)
    }

    pub fn member(&self, name: &str) -> Option<AnyState> {
        self.0.lookup(name)
    }

    /// Returns the member `name` as a concrete handle.
    pub fn get<S: FromState>(&self, name: &str) -> Result<S, StateError> {
        let state = self
            .member(name)
            .ok_or_else(|| StateError::UnknownMember(name.to_string()))?;
        state.downcast().ok_or_else(|| StateError::TypeMismatch {
            expected: short_type_name::<S>().to_string(),
            found: state.kind_name(),
        })
    }
    pub fn contains(&self, name: &str) -> bool {
        self.member(name).is_some()
    }

    /// Bound members in binding order.
    pub fn members(&self) -> Vec<(String, AnyState)> {
        self.0.members_snapshot()
    }
    pub fn names(&self) -> Vec<String> {
        self.0
            .members
            .borrow()
            .iter()
            .map(|m| m.name.clone())
            .collect()
    }
    pub fn len(&self) -> usize {
        self.0.members.borrow().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `name` is declared as a computed member.
    pub fn is_computed(&self, name: &str) -> bool {
        self.0.computed_index(name).is_some()
    }
}

fn short_type_name<T>() -> &'static str {
    let name = type_name::<T>();
    let name = name.split('<').next().unwrap_or(name);
    name.rsplit("::").next().unwrap_or(name)
}

impl CompositeNode {
    fn lookup(&self, name: &str) -> Option<AnyState> {
        self.members
            .borrow()
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.state.clone())
    }
    fn members_snapshot(&self) -> Vec<(String, AnyState)> {
        self.members
            .borrow()
            .iter()
            .map(|m| (m.name.clone(), m.state.clone()))
            .collect()
    }

    fn bind(self: &Rc<Self>, name: &str, state: AnyState) -> Result<(), StateError> {
        if self.computed_index(name).is_some() {
            return Err(StateError::ComputedMember(name.to_string()));
        }
        if self.attach(name, state)? {
            self.activate_computed()?;
        }
        Ok(())
    }

    /// Attaches `state` under `name`. Returns `false` if it was already bound there.
    fn attach(self: &Rc<Self>, name: &str, state: AnyState) -> Result<bool, StateError> {
        if let Some(current) = self.lookup(name) {
            if current == state {
                return Ok(false);
            }
            tracing::debug!(kind = %self.kind, member = name, "rejected rebinding of member");
            return Err(StateError::IllegalRebind(name.to_string()));
        }
        state.base().attach(self.base.weak())?;
        let this = Rc::downgrade(self);
        let member = name.to_string();
        let forward = state.base().register(
            move |_| {
                if let Some(node) = this.upgrade() {
                    node.child_changed(&member);
                }
            },
            false,
        );
        self.members.borrow_mut().push(Member {
            name: name.to_string(),
            state,
            forward,
        });
        Ok(true)
    }

    /// Forwarding callback installed on every child.
    ///
    /// Recomputes the computed members depending on the child inside a batch,
    /// so the composite notifies exactly once, after derived values are updated.
    fn child_changed(&self, name: &str) {
        let _batch = self.base.batch();
        for index in self.dependents(name) {
            if let Err(e) = self.update_computed(index) {
                panic!("failed to recompute a member of `{}`: {e}", self.kind);
            }
        }
    }
}

impl CompositeNode {
    fn copy_members(
        &self,
        other: &AnyState,
        copy: impl Fn(&AnyState, &AnyState) -> Result<(), StateError>,
    ) -> Result<(), StateError> {
        let mismatch = || StateError::TypeMismatch {
            expected: self.kind.clone(),
            found: other.kind_name(),
        };
        let Some(other) = other.downcast::<CompositeState>() else {
            return Err(mismatch());
        };
        if other.0.kind != self.kind {
            return Err(mismatch());
        }
        if std::ptr::eq(self, Rc::as_ptr(&other.0)) {
            return Ok(());
        }
        let _batch = self.base.batch();
        for (name, state) in self.members_snapshot() {
            let source = other.0.lookup(&name).ok_or_else(mismatch)?;
            copy(&state, &source)?;
        }
        Ok(())
    }
}

impl Drop for CompositeNode {
    fn drop(&mut self) {
        for member in take(self.members.get_mut()) {
            let base = member.state.base();
            let _ = base.unregister(member.forward);
            base.detach();
        }
    }
}

impl RawState for CompositeNode {
    fn base(&self) -> &StateBase {
        &self.base
    }
    fn kind(&self) -> &str {
        &self.kind
    }
    fn shape(&self) -> Shape {
        Shape::Composite
    }

    fn serialize(&self) -> Result<Value, StateError> {
        let mut map = Map::new();
        for (name, state) in self.members_snapshot() {
            match state.0.serialize() {
                Ok(value) => {
                    map.insert(name, value);
                }
                Err(StateError::UnserializableKind(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Value::Object(map))
    }

    fn deserialize(&self, value: &Value) -> Result<(), StateError> {
        let Value::Object(map) = value else {
            return Err(StateError::schema("mapping", value));
        };
        tracing::debug!(kind = %self.kind, len = map.len(), "deserializing composite");
        let _batch = self.base.batch();
        for (name, value) in map {
            let state = self
                .lookup(name)
                .ok_or_else(|| StateError::UnknownMember(name.clone()))?;
            if state.is_leaf() {
                let _silence = state.base().silence();
                state.0.deserialize(value)?;
            } else {
                state.0.deserialize(value)?;
            }
        }
        self.refresh_computed()
    }

    fn copy_from(&self, other: &AnyState) -> Result<(), StateError> {
        self.copy_members(other, |target, source| target.0.copy_from(source))
    }
    fn absorb(&self, fresh: &AnyState) -> Result<(), StateError> {
        self.copy_members(fresh, |target, source| target.0.absorb(source))
    }

    fn fmt_state(&self, f: &mut fmt::Formatter, indent: usize) -> fmt::Result {
        crate::fmt::fmt_composite(&self.kind, &self.members_snapshot(), f, indent)
    }
    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl Observable for CompositeState {
    fn base(&self) -> &StateBase {
        &self.0.base
    }
    fn to_state(&self) -> AnyState {
        self.clone().into()
    }
}
impl From<CompositeState> for AnyState {
    fn from(value: CompositeState) -> Self {
        AnyState(value.0)
    }
}
impl FromState for CompositeState {
    fn from_state(state: &AnyState) -> Option<Self> {
        state.downcast_node::<CompositeNode>().map(CompositeState)
    }
}

enum PendingMember {
    State(AnyState),
    Value(Box<dyn Any>, &'static str),
}

/// Declares the schema of a [`CompositeState`]: its members, computed members
/// and the leaf-kind registry used to wrap plain values.
#[must_use]
pub struct CompositeBuilder {
    kind: String,
    leaf_kinds: Option<Rc<LeafKinds>>,
    members: Vec<(String, PendingMember)>,
    computed: Vec<ComputedSlot>,
}

impl CompositeBuilder {
    /// Binds a node.
    pub fn member(mut self, name: impl Into<String>, state: impl Into<AnyState>) -> Self {
        self.members
            .push((name.into(), PendingMember::State(state.into())));
        self
    }

    /// Binds a plain value, wrapped by the leaf-kind registry.
    pub fn value<V: Any>(mut self, name: impl Into<String>, value: V) -> Self {
        self.members.push((
            name.into(),
            PendingMember::Value(Box::new(value), type_name::<V>()),
        ));
        self
    }

    /// Declares a computed member `name` derived from the members named in `params`.
    ///
    /// `compute` receives the parameter nodes in the declared order and returns a
    /// fresh node. The first result becomes the member; later results are copied
    /// into it.
    pub fn computed<S: Into<AnyState>>(
        mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = impl Into<String>>,
        compute: impl Fn(&Params) -> Result<S, StateError> + 'static,
    ) -> Self {
        let compute: ComputeFn =
            Rc::new(move |params: &Params<'_>| compute(params).map(Into::into));
        self.computed.push(ComputedSlot::new(
            name.into(),
            params.into_iter().map(Into::into).collect(),
            compute,
        ));
        self
    }

    pub fn leaf_kinds(mut self, leaf_kinds: Rc<LeafKinds>) -> Self {
        self.leaf_kinds = Some(leaf_kinds);
        self
    }

    /// Creates the composite, binding members in declaration order.
    ///
    /// Fails if a member is bound twice, if a computed member's name is bound
    /// explicitly, or if a computed member fails to compute on activation.
    pub fn build(self) -> Result<CompositeState, StateError> {
        let leaf_kinds = self.leaf_kinds.unwrap_or_else(LeafKinds::shared);
        let state = CompositeState::from_parts(self.kind, self.computed, leaf_kinds);
        for (name, member) in self.members {
            let member = match member {
                PendingMember::State(state) => state,
                PendingMember::Value(value, type_name) => {
                    state.0.leaf_kinds.wrap_boxed(value, type_name)
                }
            };
            state.0.bind(&name, member)?;
        }
        Ok(state)
    }
}
