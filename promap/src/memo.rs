//! Memoization policies for projected states.
//!
//! A projected state is a new object on every pass unless it is cached at its call site: the
//! policy decides the key under which it is cached. While the key of a call site is the `same`
//! as during the previous pass, the object created during that pass is returned again.
use crate::{Acceptor, ProjectedState};
use promap_common::Data;
use promap_compose::cache_cx;
use serde::Serialize;
use tracing::{trace, warn};

/// Decides when a derived projected state keeps its identity across passes.
pub trait Memo<S> {
    type Key: Data;

    /// Returns the cache key for a derived value, or `None` to always create a new object.
    fn key(&self, value: &S) -> Option<Self::Key>;
}

/// Keeps the identity while the derived value is the `same`. This is the default.
#[derive(Copy, Clone, Debug, Default)]
pub struct ByValue;

impl<S: Data> Memo<S> for ByValue {
    type Key = S;

    fn key(&self, value: &S) -> Option<S> {
        Some(value.clone())
    }
}

/// Keeps the identity while the JSON serialization of the derived value is unchanged.
///
/// Values that fail to serialize are never cached.
#[derive(Copy, Clone, Debug, Default)]
pub struct BySerialized;

impl<S: Serialize> Memo<S> for BySerialized {
    type Key = String;

    fn key(&self, value: &S) -> Option<String> {
        match serde_json::to_string(value) {
            Ok(json) => Some(json),
            Err(err) => {
                warn!("BySerialized: could not serialize value ({err}), creating a fresh projected state");
                None
            }
        }
    }
}

/// Keeps the identity while the given dependencies are the `same`, whatever the derived value.
///
/// Use a tuple to depend on several values.
#[derive(Copy, Clone, Debug, Default)]
pub struct Deps<D>(pub D);

impl<S, D: Data> Memo<S> for Deps<D> {
    type Key = D;

    fn key(&self, _value: &S) -> Option<D> {
        Some(self.0.clone())
    }
}

/// Creates a new object on every pass.
#[derive(Copy, Clone, Debug, Default)]
pub struct Fresh;

impl<S> Memo<S> for Fresh {
    type Key = ();

    fn key(&self, _value: &S) -> Option<()> {
        None
    }
}

/// Returns the projected state cached at the caller's site if the key given by `memo` is
/// unchanged, otherwise a new one.
///
/// Outside of `Cache::run` there is nothing to cache into, and a new object is returned.
#[track_caller]
pub(crate) fn memoized<S: Data>(memo: &impl Memo<S>, value: S, accept: Acceptor<S>) -> ProjectedState<S> {
    if !cache_cx::is_composing() {
        return ProjectedState::new(value, accept);
    }
    match memo.key(&value) {
        Some(key) => cache_cx::memoize(key, move || {
            trace!("creating projected state");
            ProjectedState::new(value, accept)
        }),
        None => ProjectedState::new(value, accept),
    }
}
