use crate::CallId;
use thiserror::Error;

/// Errors reported by the cache context API.
///
/// All of them are contract violations by the caller: the panicking variants of the
/// `cache_cx` functions turn them into panics with the same message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("this function cannot be called outside of `Cache::run`")]
    OutsideComposition,
    #[error("the cache variable at {0:?} holds a value of a different type")]
    VariableTypeMismatch(CallId),
    #[error("unbalanced calls to enter/exit a cache scope")]
    UnbalancedCalls,
    #[error("`Cache::run` cannot be called recursively")]
    Reentrant,
}
