use crate::{
    memo::{memoized, ByValue, Memo},
    Acceptor, Lens, Rule, Update,
};
use promap_common::Data;
use promap_compose::State;
use std::{fmt, rc::Rc};
use tracing::trace;

/// Owner of a value that projected states can be rooted on.
pub trait Store<T> {
    /// Returns the current value.
    fn current(&self) -> T;

    /// Applies an update rule to the value current at the time of the call.
    ///
    /// If the rule returns `Some`, the store replaces its value and notifies whoever depends on it.
    fn apply(&self, rule: Rule<T>);
}

impl<T: Data> Store<T> for State<T> {
    fn current(&self) -> T {
        self.get()
    }

    fn apply(&self, rule: Rule<T>) {
        State::apply(self, rule);
    }
}

struct Inner<T> {
    value: T,
    accept: Acceptor<T>,
}

/// A snapshot of a value together with the means to update it.
///
/// Projected states are derived from a root (see `create_projected_state`) with `project`: the
/// derived state holds the inner value, and updates made through it are translated back into
/// updates of the root. Projected states are immutable: an update is visible in the states
/// obtained during the next pass, not in the one it was made through.
///
/// Cloning is cheap and preserves identity (`ptr_eq`), and `Data::same` on projected states
/// compares identity.
pub struct ProjectedState<T>(Rc<Inner<T>>);

impl<T> Clone for ProjectedState<T> {
    fn clone(&self) -> Self {
        ProjectedState(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for ProjectedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ProjectedState")
            .field("value", &self.0.value)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Data for ProjectedState<T> {
    fn same(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> ProjectedState<T> {
    /// Returns the value.
    pub fn value(&self) -> &T {
        &self.0.value
    }

    /// Returns whether two projected states are the same object.
    pub fn ptr_eq(&self, other: &ProjectedState<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Data> ProjectedState<T> {
    /// Creates a projected state from a value and the function that accepts its updates.
    pub fn new(value: T, accept: Acceptor<T>) -> ProjectedState<T> {
        ProjectedState(Rc::new(Inner { value, accept }))
    }

    /// Creates an unmemoized root over a store.
    pub fn from_store(store: impl Store<T> + 'static) -> ProjectedState<T> {
        let value = store.current();
        let store = Rc::new(store);
        ProjectedState::new(value, Rc::new(move |rule: Rule<T>| store.apply(rule)))
    }

    /// Creates a root over a state variable, memoized by value at the caller's site.
    #[track_caller]
    pub fn from_state(state: &State<T>) -> ProjectedState<T> {
        Self::from_state_with(state, ByValue)
    }

    /// Creates a root over a state variable, memoized at the caller's site according to `memo`.
    #[track_caller]
    pub fn from_state_with(state: &State<T>, memo: impl Memo<T>) -> ProjectedState<T> {
        let value = state.get();
        let state = state.clone();
        let accept: Acceptor<T> = Rc::new(move |rule: Rule<T>| {
            state.apply(rule);
        });
        memoized(&memo, value, accept)
    }

    /// Forwards an update rule to the owner of the value.
    ///
    /// The rule is evaluated against the value current at the time it is applied, which may be
    /// more recent than `self.value()`.
    pub fn apply(&self, rule: impl FnOnce(&T) -> Option<T> + 'static) {
        (self.0.accept)(Box::new(rule))
    }

    /// Applies an update.
    ///
    /// An update that results in a value that is the `same` as the current one does nothing.
    pub fn accept(&self, update: impl Into<Update<T>>) {
        let update = update.into();
        self.apply(move |current| {
            let new_value = update.apply(current);
            if new_value.same(current) {
                trace!("update is a no-op");
                None
            } else {
                Some(new_value)
            }
        })
    }

    /// Replaces the value.
    pub fn set(&self, value: T) {
        self.accept(Update::Set(value))
    }

    /// Replaces the value by `f(current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T + 'static) {
        self.accept(Update::modify(f))
    }

    /// Derives a projected state over a part of the value, memoized by value at the caller's site.
    ///
    /// `inward` extracts the part from the value. `outward` receives the outer value current at
    /// the time of an update and the new part, and returns the new outer value. Both must be pure.
    #[track_caller]
    pub fn project<S: Data>(
        &self,
        inward: impl Fn(&T) -> S + 'static,
        outward: impl Fn(&T, S) -> T + 'static,
    ) -> ProjectedState<S> {
        self.project_with(inward, outward, ByValue)
    }

    /// Same as `project`, with an explicit memoization policy.
    #[track_caller]
    pub fn project_with<S: Data>(
        &self,
        inward: impl Fn(&T) -> S + 'static,
        outward: impl Fn(&T, S) -> T + 'static,
        memo: impl Memo<S>,
    ) -> ProjectedState<S> {
        let inward = Rc::new(inward);
        let outward = Rc::new(outward);
        let value = inward(&self.0.value);
        let parent = self.0.accept.clone();

        let accept: Acceptor<S> = Rc::new(move |rule: Rule<S>| {
            let inward = inward.clone();
            let outward = outward.clone();
            parent(Box::new(move |outer: &T| {
                // derive from the latest outer value, not from the one seen when projecting
                let current = inward(outer);
                let new_value = rule(&current)?;
                if new_value.same(&current) {
                    trace!("projected update is a no-op");
                    return None;
                }
                Some(outward(outer, new_value))
            }))
        });

        memoized(&memo, value, accept)
    }

    /// Derives a projected state through a lens, memoized by value at the caller's site.
    #[track_caller]
    pub fn project_lens<S: Data>(&self, lens: impl Lens<T, S> + 'static) -> ProjectedState<S> {
        self.project_lens_with(lens, ByValue)
    }

    /// Same as `project_lens`, with an explicit memoization policy.
    #[track_caller]
    pub fn project_lens_with<S: Data>(&self, lens: impl Lens<T, S> + 'static, memo: impl Memo<S>) -> ProjectedState<S> {
        let lens = Rc::new(lens);
        let lens2 = lens.clone();
        self.project_with(move |outer| lens.get(outer), move |outer, inner| lens2.set(outer, inner), memo)
    }
}
