//! Positional cache.
//!
//! The cache records, for each pass of a function run with `Cache::run`, the cache variables
//! created at each call site. Variables are stored in a flat slot table in pre-order: each node
//! stores the size of its subtree, so that siblings can be found by hopping over subtrees.
//! On the next pass, call sites are matched by `CallId` against the recorded nodes; nodes that
//! are not visited during a pass are dropped at the end of their enclosing scope.
use crate::{
    cache_cx::{self, CacheContextTLS, CACHE_CONTEXT},
    call_id::{CallId, CallIdStack},
    Error,
};
use promap_common::Data;
use smallvec::SmallVec;
use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt, mem,
    panic::Location,
    rc::Rc,
    task::Waker,
};
use tracing::{debug, trace, warn};

//==================================================================================================

/// Entry representing a mutable cache variable inside a composition cache.
pub struct CacheVar<T: ?Sized = dyn Any> {
    /// Whether this entry must be recomputed.
    dirty: Cell<bool>,
    waker: Waker,
    /// Variables to invalidate when this one changes.
    dependents: RefCell<SmallVec<[Rc<CacheVar>; 4]>>,
    pub(crate) value: RefCell<T>,
}

impl<T> CacheVar<T> {
    fn new(initial_value: T, waker: Waker) -> CacheVar<T> {
        CacheVar {
            dirty: Cell::new(false),
            waker,
            dependents: RefCell::new(SmallVec::new()),
            value: RefCell::new(initial_value),
        }
    }
}

impl<T: ?Sized> fmt::Debug for CacheVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CacheVar")
            .field("dirty", &self.dirty.get())
            .field("dependents", &self.dependents.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> CacheVar<T> {
    /// Returns whether this cache variable is dirty.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.dirty.set(dirty)
    }

    fn invalidate(&self) {
        self.set_dirty(true);
        self.invalidate_dependents();
    }

    fn invalidate_dependents(&self) {
        // clone the list so that dependents can register new dependencies while being invalidated
        let dependents = self.dependents.borrow().clone();
        for d in dependents.iter() {
            d.invalidate();
        }
    }

    /// Invalidates dependents and wakes up the owner of the cache.
    fn notify(&self) {
        self.invalidate_dependents();
        self.waker.wake_by_ref();
    }

    fn add_dependent(&self, dep: Rc<CacheVar>) {
        if Rc::as_ptr(&dep).cast::<()>() == (self as *const Self).cast::<()>() {
            // a variable read within its own scope
            return;
        }
        let mut deps = self.dependents.borrow_mut();
        if !deps.iter().any(|d| Rc::ptr_eq(d, &dep)) {
            deps.push(dep);
        }
    }

    /// Sets this cache variable as a dependency of the current parent cache variable.
    ///
    /// This does nothing if executed outside of a caching context.
    pub fn set_dependency(&self) {
        if let Some(parent) = cache_cx::parent_var() {
            self.add_dependent(parent);
        }
    }
}

impl<T: 'static> CacheVar<T> {
    /// Sets the value of this cache variable and returns the previous value.
    ///
    /// If `invalidate` is true, dependents are invalidated and the cache owner is woken up.
    pub fn replace(&self, new_value: T, invalidate: bool) -> T {
        let prev = mem::replace(&mut *self.value.borrow_mut(), new_value);
        if invalidate {
            self.notify();
        }
        prev
    }

    /// Computes a new value from the current one.
    ///
    /// The current value is never modified in place: if `f` returns `Some`, the value is
    /// replaced by the result and the dependents are notified. If it returns `None`, nothing
    /// happens. Returns whether the value was replaced.
    pub fn update_with(&self, f: impl FnOnce(&T) -> Option<T>) -> bool {
        let new_value = f(&self.value.borrow());
        match new_value {
            Some(new_value) => {
                *self.value.borrow_mut() = new_value;
                self.notify();
                true
            }
            None => false,
        }
    }

    /// Calls `f` with a reference to the current value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }
}

impl<T: Clone + 'static> CacheVar<T> {
    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }
}

//==================================================================================================

/// A variable in the slot table.
struct VarNode {
    /// Call site identification
    call_id: CallId,
    /// Type-erased variable, for invalidation.
    var: Rc<CacheVar>,
    /// Same variable, for downcasting to `CacheVar<T>`.
    typed: Rc<dyn Any>,
    /// Number of slots in the subtree rooted at this node, including the node itself.
    len: usize,
}

/// Cache configuration.
#[derive(Copy, Clone, Debug)]
pub struct CacheConfig {
    /// How many times `Cache::run` repeats a pass that left the cache dirty before giving up.
    pub max_reruns: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { max_reruns: 16 }
    }
}

/// Composition cache. Contains the recorded call tree and state variables.
struct CacheInner {
    waker: Waker,
    config: CacheConfig,
    /// State variables.
    nodes: Vec<VarNode>,
    /// The number of passes run so far.
    revision: usize,
    /// Root variable.
    root: Rc<CacheVar<()>>,
}

impl CacheInner {
    fn new(waker: Waker, config: CacheConfig) -> CacheInner {
        let root = Rc::new(CacheVar::new((), waker.clone()));
        let root_node = VarNode {
            call_id: CallId::DUMMY,
            var: root.clone(),
            typed: root.clone(),
            len: 1,
        };
        CacheInner {
            waker,
            config,
            nodes: vec![root_node],
            revision: 0,
            root,
        }
    }

    fn dump(&self) {
        for (i, node) in self.nodes.iter().enumerate() {
            debug!(
                "{:3} call_id={:?} len={} (end={}) dirty={:5} var={:p} dependents={}",
                i,
                node.call_id,
                node.len,
                i + node.len,
                node.var.is_dirty(),
                Rc::as_ptr(&node.var),
                node.var.dependents.borrow().len(),
            );
        }
    }
}

/// Saved state of an enclosing scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Scope {
    /// Position of the variable node that owns the scope.
    pos: usize,
    /// Size of the scope when it was entered.
    len_before: usize,
    /// Current size of the scope.
    len: usize,
}

/// Holds the state during cache updates (`Cache::run`).
pub(crate) struct CacheContext {
    cache: CacheInner,
    /// Current position in the slot table.
    pos: usize,
    /// Size of the current scope when it was entered.
    scope_len_before: usize,
    /// Current size of the current scope (grows when nodes are inserted).
    scope_len: usize,
    id_stack: CallIdStack,
    /// Enclosing scopes.
    scopes: Vec<Scope>,
}

const ROOT_SCOPE: Scope = Scope {
    pos: 0,
    len_before: 0,
    len: 0,
};

impl CacheContext {
    fn new(cache: CacheInner) -> CacheContext {
        let root_len = cache.nodes[0].len;
        cache.root.set_dirty(false);
        let mut id_stack = CallIdStack::new();
        id_stack.enter_root();
        CacheContext {
            cache,
            pos: 1,
            scope_len_before: root_len,
            scope_len: root_len,
            id_stack,
            scopes: vec![ROOT_SCOPE],
        }
    }

    fn finish(mut self) -> Result<(CacheInner, bool), Error> {
        if self.scopes.pop() != Some(ROOT_SCOPE) || !self.scopes.is_empty() {
            return Err(Error::UnbalancedCalls);
        }
        // drop the nodes that were not visited at the root level
        self.cache.nodes.truncate(self.pos);
        self.cache.nodes[0].len = self.pos;
        if !self.id_stack.exit() || !self.id_stack.is_empty() {
            return Err(Error::UnbalancedCalls);
        }
        let should_rerun = self.cache.root.is_dirty();
        Ok((self.cache, should_rerun))
    }

    /// Returns the current cache revision.
    pub(crate) fn revision(&self) -> usize {
        self.cache.revision
    }

    /// Returns the position at the end of the current scope.
    fn scope_end(&self) -> usize {
        self.scopes.last().map_or(0, |scope| scope.pos) + self.scope_len
    }

    /// Finds a node at the current level with the specified call ID, starting from the current position.
    fn find_node(&self, call_id: CallId) -> Option<usize> {
        let end = self.scope_end();
        let mut i = self.pos;
        while i < end {
            let node = &self.cache.nodes[i];
            if node.call_id == call_id {
                return Some(i);
            }
            i += node.len;
        }
        None
    }

    /// Moves the subtree at `pos` to the current position; the skipped siblings go after it.
    fn rotate_in_current_position(&mut self, pos: usize) {
        if pos != self.pos {
            let end = self.scope_end();
            self.cache.nodes[self.pos..end].rotate_left(pos - self.pos);
        }
    }

    //===========================================================

    /// Enters the scope of the variable for the current call site, creating it with `init` if
    /// it doesn't exist. Returns the variable and whether it was created.
    pub(crate) fn enter_var<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Result<(Rc<CacheVar<T>>, bool), Error> {
        let call_id = self.id_stack.current();

        let (var, inserted, len) = match self.find_node(call_id) {
            Some(found) => {
                self.rotate_in_current_position(found);
                let node = &self.cache.nodes[self.pos];
                let var = node
                    .typed
                    .clone()
                    .downcast::<CacheVar<T>>()
                    .map_err(|_| Error::VariableTypeMismatch(call_id))?;
                (var, false, node.len)
            }
            None => {
                let var = Rc::new(CacheVar::new(init(), self.cache.waker.clone()));
                self.cache.nodes.insert(
                    self.pos,
                    VarNode {
                        call_id,
                        var: var.clone(),
                        typed: var.clone(),
                        len: 1,
                    },
                );
                self.scope_len += 1;
                (var, true, 1)
            }
        };

        self.scopes.push(Scope {
            pos: self.pos,
            len_before: self.scope_len_before,
            len: self.scope_len,
        });
        self.scope_len_before = len;
        self.scope_len = len;
        self.pos += 1;
        Ok((var, inserted))
    }

    pub(crate) fn exit_var(&mut self) -> Result<(), Error> {
        if self.scopes.len() <= 1 {
            return Err(Error::UnbalancedCalls);
        }

        // the remaining nodes in the scope were not visited in this pass
        let end = self.scope_end();
        self.cache.nodes.drain(self.pos..end);

        let scope = self.scopes.pop().ok_or(Error::UnbalancedCalls)?;
        let new_len = self.pos - scope.pos;
        self.cache.nodes[scope.pos].len = new_len;

        // propagate the change of size of the child to the parent scope
        let len = scope.len + new_len;
        self.scope_len = len.checked_sub(self.scope_len_before).ok_or(Error::UnbalancedCalls)?;
        self.scope_len_before = scope.len_before;
        Ok(())
    }

    pub(crate) fn enter_call_scope(&mut self, location: &'static Location<'static>, index: usize) {
        self.id_stack.enter(location, index);
    }

    pub(crate) fn exit_call_scope(&mut self) -> Result<(), Error> {
        // the root scope is only exited by `finish`
        if self.id_stack.depth() <= 1 {
            return Err(Error::UnbalancedCalls);
        }
        self.id_stack.exit();
        Ok(())
    }

    pub(crate) fn skip_until_end_of_group(&mut self) {
        self.pos = self.scope_end();
    }

    /// Stores `new_value` in a variable at the current call site; returns whether it changed.
    pub(crate) fn compare_and_update<T: Data>(&mut self, new_value: T) -> Result<bool, Error> {
        let (var, inserted) = self.enter_var(|| new_value.clone())?;
        self.exit_var()?;
        if inserted {
            return Ok(true);
        }
        let mut value = var.value.borrow_mut();
        if new_value.same(&value) {
            Ok(false)
        } else {
            *value = new_value;
            Ok(true)
        }
    }

    /// Returns the variable owning the current scope.
    pub(crate) fn parent_var(&self) -> Rc<CacheVar> {
        let pos = self.scopes.last().map_or(0, |scope| scope.pos);
        self.cache.nodes[pos].var.clone()
    }

    /// Returns the current caller ID.
    pub(crate) fn caller_id(&self) -> CallId {
        self.id_stack.current()
    }

    pub(crate) fn caller_location(&self) -> Option<&'static Location<'static>> {
        self.id_stack.current_site().map(|(location, _)| location)
    }
}

//==================================================================================================

/// Removes the context of a pass from the thread when the pass unwinds.
///
/// The call tree recorded by an interrupted pass is not usable: the cache is reset to an empty
/// one with the same waker and configuration.
struct PassGuard<'a> {
    slot: &'a mut Option<CacheInner>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        // the context is still installed only if the pass did not return normally
        let tls = CACHE_CONTEXT.with(|cx_cell| cx_cell.try_borrow_mut().ok().and_then(|mut cx| cx.take()));
        if let Some(tls) = tls {
            let CacheInner {
                waker, config, revision, ..
            } = tls.cx.cache;
            warn!(revision, "Cache::run: pass interrupted by a panic, cached state discarded");
            let mut cache = CacheInner::new(waker, config);
            cache.revision = revision;
            *self.slot = Some(cache);
        }
    }
}

//==================================================================================================

/// A composition cache.
///
/// Functions run with `Cache::run` can create state variables (`State`, `cache_cx::variable`)
/// and memoize values (`cache_cx::memoize`); those persist across runs as long as the same call
/// sites are visited.
pub struct Cache {
    inner: Option<CacheInner>,
}

impl Cache {
    pub fn new(waker: Waker) -> Cache {
        Cache::with_config(waker, CacheConfig::default())
    }

    pub fn with_config(waker: Waker, config: CacheConfig) -> Cache {
        Cache {
            inner: Some(CacheInner::new(waker, config)),
        }
    }

    /// Returns whether the cached state has been dirtied from external sources.
    ///
    /// Typically, this is set when a state variable read during the last run has been modified,
    /// and means that the function should be run again.
    pub fn is_dirty(&self) -> bool {
        self.inner.as_ref().map_or(true, |inner| inner.root.is_dirty())
    }

    /// Returns the number of passes run so far.
    pub fn revision(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.revision)
    }

    /// Returns the number of variables currently held in the cache (including the root).
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.nodes.len())
    }

    /// Runs a cached function with the cache.
    ///
    /// If `function` panics, the panic is propagated and the thread is left outside of any pass.
    /// The cache stays usable, but the state it held is lost.
    ///
    /// # Panics
    ///
    /// Panics if called from within another `Cache::run`, or if the function left call scopes
    /// unbalanced.
    pub fn run<T>(&mut self, mut function: impl FnMut() -> T) -> T {
        let mut inner = match self.inner.take() {
            Some(inner) => inner,
            None => panic!("the cache was left in an inconsistent state by a previous run"),
        };
        let mut reruns = 0;

        loop {
            inner.revision += 1;
            let revision = inner.revision;

            let entered = CACHE_CONTEXT.with(|cx_cell| {
                let mut cx = cx_cell.borrow_mut();
                if cx.is_some() {
                    return Err(inner);
                }
                *cx = Some(CacheContextTLS {
                    cx: CacheContext::new(inner),
                });
                Ok(())
            });
            if let Err(mut inner) = entered {
                // the context belongs to the enclosing pass, leave it alone
                inner.revision -= 1;
                self.inner = Some(inner);
                panic!("{}", Error::Reentrant);
            }

            trace!(revision, "Cache::run: pass started");
            let guard = PassGuard { slot: &mut self.inner };
            let result = function();
            let tls = CACHE_CONTEXT.with(|cx_cell| cx_cell.borrow_mut().take());
            drop(guard);

            let Some(tls) = tls else {
                panic!("{}", Error::OutsideComposition);
            };
            let (cache, should_rerun) = match tls.cx.finish() {
                Ok(finished) => finished,
                Err(err) => panic!("{err}"),
            };
            inner = cache;

            if should_rerun {
                if reruns < inner.config.max_reruns {
                    // state was modified during the pass: the result may be inconsistent
                    reruns += 1;
                    debug!(revision, reruns, "Cache::run: state changed during the pass, running again");
                    continue;
                }
                warn!(
                    revision,
                    max_reruns = inner.config.max_reruns,
                    "Cache::run: state keeps changing during the pass, giving up"
                );
            }

            self.inner = Some(inner);
            break result;
        }
    }

    /// Logs the contents of the slot table at the `debug` level.
    pub fn dump(&self) {
        if let Some(inner) = self.inner.as_ref() {
            inner.dump();
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Cache")
            .field("revision", &self.revision())
            .field("len", &self.len())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
