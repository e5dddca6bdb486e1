use crate::{
    memo::{ByValue, Memo},
    ProjectedState,
};
use promap_common::Data;
use promap_compose::{cache_cx, State};

/// Creates a state variable initialized with `initial` at the caller's site and returns the root
/// projected state over it, memoized by value.
///
/// Must be called inside `Cache::run`. `initial` is only used during the first pass.
#[track_caller]
pub fn create_projected_state<T: Data>(initial: T) -> ProjectedState<T> {
    create_projected_state_with(initial, ByValue)
}

/// Same as `create_projected_state`, with an explicit memoization policy for the root.
#[track_caller]
pub fn create_projected_state_with<T: Data>(initial: T, memo: impl Memo<T>) -> ProjectedState<T> {
    cache_cx::scoped(0, move || {
        let state = State::new(move || initial);
        ProjectedState::from_state_with(&state, memo)
    })
}

/// Wraps a function that takes a projected state into a function that creates the root state
/// itself, to be run with `Cache::run`.
///
/// All calls of the returned function during a pass share the same call site: to use several
/// wrapped functions in the same pass, run each in its own `cache_cx::scoped`.
pub fn with_projected_state<T, R>(initial: T, component: impl FnMut(ProjectedState<T>) -> R) -> impl FnMut() -> R
where
    T: Data,
{
    with_projected_state_memo(initial, ByValue, component)
}

/// Same as `with_projected_state`, with an explicit memoization policy for the root.
pub fn with_projected_state_memo<T, R, M>(
    initial: T,
    memo: M,
    mut component: impl FnMut(ProjectedState<T>) -> R,
) -> impl FnMut() -> R
where
    T: Data,
    M: Memo<T> + Clone,
{
    move || {
        let root = create_projected_state_with(initial.clone(), memo.clone());
        component(root)
    }
}
