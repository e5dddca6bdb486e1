use crate::{cache_cx, CacheVar};
use promap_common::Data;
use std::{fmt, rc::Rc};

/// A state variable stored in the composition cache.
///
/// This is the mutable cell that owns a piece of state across passes. Reading it through `get`
/// or `with` inside `Cache::run` makes the current scope dependent on it; writing it invalidates
/// those scopes and wakes up the cache owner.
pub struct State<T>(Rc<CacheVar<T>>);

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        State(self.0.clone())
    }
}

impl<T> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl<T: Default + 'static> Default for State<T> {
    #[track_caller]
    fn default() -> Self {
        Self::new(Default::default)
    }
}

impl<T: 'static> State<T> {
    /// Returns the state variable at the caller's site, initialized with `init` on the first pass.
    ///
    /// Must be called inside `Cache::run`.
    #[track_caller]
    pub fn new(init: impl FnOnce() -> T) -> State<T> {
        State(cache_cx::variable(init).0)
    }

    /// Wraps an existing cache variable.
    pub fn from_var(var: Rc<CacheVar<T>>) -> State<T> {
        State(var)
    }

    /// Returns the value of the cache entry and replaces it by the given value.
    ///
    /// Always invalidates. Can be called outside of recomposition.
    pub fn replace(&self, new_value: T) -> T {
        self.0.replace(new_value, true)
    }

    /// Returns the value of the cache entry and replaces it by the given value.
    ///
    /// Does not invalidate the dependent entries.
    pub fn replace_without_invalidation(&self, new_value: T) -> T {
        self.0.replace(new_value, false)
    }

    /// Calls `f` with the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.0.set_dependency();
        self.0.with(f)
    }

    /// Returns whether two handles refer to the same variable.
    pub fn ptr_eq(&self, other: &State<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone + 'static> State<T> {
    /// Returns the current value.
    pub fn get(&self) -> T {
        self.0.set_dependency();
        self.0.get()
    }
}

impl<T: Default + 'static> State<T> {
    /// Returns the value of the cache entry and replaces it by the default value.
    pub fn take(&self) -> T {
        self.replace(T::default())
    }

    /// Returns the value of the cache entry and replaces it by the default value. Does not invalidate dependent entries.
    pub fn take_without_invalidation(&self) -> T {
        self.replace_without_invalidation(T::default())
    }
}

impl<T: Data> State<T> {
    /// Applies an update rule to the current value.
    ///
    /// `rule` sees the value as it is at the time of the call, including the effect of updates
    /// made since the last pass. The value is replaced, and dependents notified, only if the
    /// rule returns a value that is not `same` as the current one. Returns whether the value
    /// was replaced.
    pub fn apply(&self, rule: impl FnOnce(&T) -> Option<T>) -> bool {
        self.0.update_with(|current| rule(current).filter(|new_value| !new_value.same(current)))
    }

    /// Replaces the value if it is different from the current one.
    pub fn set(&self, new_value: T) -> bool {
        self.apply(move |_| Some(new_value))
    }

    /// Replaces the value by `f(current)` if that is different from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        self.apply(move |current| Some(f(current)))
    }
}

impl<T: 'static> Data for State<T> {
    fn same(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}
