//! Cache context API.
//!
//! Functions available within a caching context (see `Cache::run`). The plain functions panic
//! when called outside of `Cache::run`; the `try_` variants return an `Error` instead.
use crate::{
    cache::{CacheContext, CacheVar},
    call_id::CallId,
    Error,
};
use promap_common::Data;
use std::{
    cell::RefCell,
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    panic::Location,
    rc::Rc,
};
use tracing::trace;

/// Context stored in TLS when running a function within the positional cache.
pub(crate) struct CacheContextTLS {
    pub(crate) cx: CacheContext,
}

thread_local! {
    // The cache context is put in TLS so that we don't have to pass an additional parameter
    // to all functions. The cache context lives on the main thread.
    pub(crate) static CACHE_CONTEXT: RefCell<Option<CacheContextTLS>> = RefCell::new(None);
}

//==================================================================================================
// Cache context API

fn try_with_cache_cx<R>(f: impl FnOnce(&mut CacheContext) -> R) -> Result<R, Error> {
    CACHE_CONTEXT.with(|cx_cell| match &mut *cx_cell.borrow_mut() {
        Some(tls) => Ok(f(&mut tls.cx)),
        None => Err(Error::OutsideComposition),
    })
}

fn with_cache_cx<R>(f: impl FnOnce(&mut CacheContext) -> R) -> R {
    match try_with_cache_cx(f) {
        Ok(r) => r,
        Err(err) => panic!("{err}"),
    }
}

fn expect_ok<T>(result: Result<T, Error>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

/// Returns whether we are currently inside `Cache::run`.
pub fn is_composing() -> bool {
    CACHE_CONTEXT.with(|cx_cell| cx_cell.try_borrow().map_or(true, |cx| cx.is_some()))
}

/// Returns the variable owning the current scope, if any.
pub(crate) fn parent_var() -> Option<Rc<CacheVar>> {
    CACHE_CONTEXT.with(|cx_cell| {
        let cx = cx_cell.try_borrow().ok()?;
        cx.as_ref().map(|tls| tls.cx.parent_var())
    })
}

/// Returns the current call-trace identifier.
pub fn current_call_id() -> CallId {
    with_cache_cx(|cx| cx.caller_id())
}

/// Returns the current cache revision.
pub fn revision() -> usize {
    with_cache_cx(|cx| cx.revision())
}

/// Must be called inside `Cache::run`.
#[track_caller]
pub fn enter_call(index: impl Hash) {
    let mut hasher = DefaultHasher::new();
    index.hash(&mut hasher);
    let location = Location::caller();
    let index = hasher.finish() as usize;
    with_cache_cx(move |cx| cx.enter_call_scope(location, index));
}

/// Must be called inside `Cache::run`.
pub fn exit_call() {
    expect_ok(with_cache_cx(|cx| cx.exit_call_scope()));
}

/// Runs `f` in a call scope identified by `index`.
///
/// Use this to distinguish calls made from the same call site, e.g. in loops.
/// Must be called inside `Cache::run`.
#[track_caller]
pub fn scoped<R>(index: impl Hash, f: impl FnOnce() -> R) -> R {
    enter_call(index);
    let r = f();
    exit_call();
    r
}

/// Returns whether `value` is different from the value passed at this call site during the
/// previous pass. Always returns `true` the first time.
#[track_caller]
pub fn changed<T: Data>(value: T) -> bool {
    let location = Location::caller();
    expect_ok(with_cache_cx(move |cx| {
        cx.enter_call_scope(location, 0);
        let changed = cx.compare_and_update(value);
        cx.exit_call_scope()?;
        changed
    }))
}

/// Returns the cache variable at this call site, creating it with `init` on the first pass.
///
/// The boolean is `true` if the variable was just created. `init` must not call back into the
/// cache context.
#[track_caller]
pub fn try_variable<T: 'static>(init: impl FnOnce() -> T) -> Result<(Rc<CacheVar<T>>, bool), Error> {
    let location = Location::caller();
    try_with_cache_cx(move |cx| {
        cx.enter_call_scope(location, 0);
        let entered = cx.enter_var(init);
        if entered.is_ok() {
            cx.exit_var()?;
        }
        cx.exit_call_scope()?;
        entered
    })?
}

/// Panicking version of `try_variable`.
#[track_caller]
pub fn variable<T: 'static>(init: impl FnOnce() -> T) -> (Rc<CacheVar<T>>, bool) {
    expect_ok(try_variable(init))
}

/// Runs the function only once at the call site and caches the result (like memoize without parameters).
#[track_caller]
pub fn once<T: Clone + 'static>(f: impl FnOnce() -> T) -> T {
    variable(f).0.get()
}

/// Memoizes the result of a function at this call site.
///
/// `f` runs on the first pass, when `args` is not `same` as the value passed during the previous
/// pass, or when a cache variable read by `f` during its last run has changed. Otherwise the
/// previously returned value is returned again.
#[track_caller]
pub fn try_memoize<Args: Data, T: Clone + 'static>(args: Args, f: impl FnOnce() -> T) -> Result<T, Error> {
    let location = Location::caller();

    let (result_var, dirty) = try_with_cache_cx(move |cx| {
        cx.enter_call_scope(location, 0);
        let entered = cx.compare_and_update(args).and_then(|args_changed| {
            let (result_var, inserted) = cx.enter_var(|| None::<T>)?;
            if args_changed && !inserted {
                trace!("memoize: recomputing at {location} because arguments have changed");
            }
            if result_var.is_dirty() {
                trace!("memoize: recomputing at {location} because a dependency has changed");
            }
            let dirty = inserted || args_changed || result_var.is_dirty();
            Ok((result_var, dirty))
        });
        if entered.is_err() {
            cx.exit_call_scope()?;
        }
        entered
    })??;

    let cached = if dirty { None } else { result_var.get() };
    let value = match cached {
        Some(value) => {
            trace!("memoize: clean at {location}");
            try_with_cache_cx(|cx| cx.skip_until_end_of_group())?;
            value
        }
        None => {
            let value = f();
            result_var.replace(Some(value.clone()), false);
            result_var.set_dirty(false);
            value
        }
    };

    try_with_cache_cx(|cx| {
        cx.exit_var()?;
        cx.exit_call_scope()
    })??;

    // make the parent variable dependent on this value
    result_var.set_dependency();
    Ok(value)
}

/// Panicking version of `try_memoize`.
#[track_caller]
pub fn memoize<Args: Data, T: Clone + 'static>(args: Args, f: impl FnOnce() -> T) -> T {
    expect_ok(try_memoize(args, f))
}

/// Runs the function if `args` have changed since the last pass, otherwise returns `None`.
#[track_caller]
pub fn run_if_changed<Args: Data, T>(args: Args, f: impl FnOnce() -> T) -> Option<T> {
    if changed(args) {
        Some(f())
    } else {
        None
    }
}

/// Skips the remaining variables of the current scope, keeping them alive.
pub fn skip_to_end_of_group() {
    with_cache_cx(|cx| cx.skip_until_end_of_group())
}

/// Returns the source location of the innermost call scope.
pub fn current_location() -> Option<&'static Location<'static>> {
    try_with_cache_cx(|cx| cx.caller_location()).ok().flatten()
}
