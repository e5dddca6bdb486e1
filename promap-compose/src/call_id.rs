use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    num::NonZeroU64,
    panic::Location,
};

/// Identifies a particular call in a trace of function calls.
///
/// A `CallId` is a hash of the call site (`Location` plus an index) chained with the `CallId` of
/// the enclosing scope, so the same function called from two different places gets two different
/// identifiers.
#[derive(Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CallId(NonZeroU64);

impl CallId {
    pub const DUMMY: CallId = CallId(NonZeroU64::MAX);

    pub fn to_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for CallId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CallId").field(&format_args!("{:016X}", self.0)).finish()
    }
}

/// An entry of the call stack.
#[derive(Clone, Copy, Debug)]
struct Frame {
    id: CallId,
    /// `None` for the root scope of a pass.
    location: Option<&'static Location<'static>>,
    index: usize,
}

/// Stack of the call scopes entered during a cache pass.
pub(crate) struct CallIdStack {
    frames: Vec<Frame>,
}

impl CallIdStack {
    /// Creates a new empty stack.
    pub(crate) fn new() -> CallIdStack {
        CallIdStack { frames: vec![] }
    }

    fn chain_hash(&self, location: Option<&'static Location<'static>>, index: usize) -> NonZeroU64 {
        let parent = self.frames.last().map_or(CallId::DUMMY, |frame| frame.id);
        let mut hasher = DefaultHasher::new();
        parent.hash(&mut hasher);
        location.hash(&mut hasher);
        index.hash(&mut hasher);
        // zero is not a valid id, fold it onto 1
        NonZeroU64::new(hasher.finish()).unwrap_or(NonZeroU64::MIN)
    }

    fn push(&mut self, location: Option<&'static Location<'static>>, index: usize) -> CallId {
        let id = CallId(self.chain_hash(location, index));
        self.frames.push(Frame { id, location, index });
        id
    }

    /// Enters the root scope of a pass, which has no source location.
    ///
    /// The root id only depends on the parent scope, so it is the same whichever code runs the pass.
    pub(crate) fn enter_root(&mut self) -> CallId {
        self.push(None, 0)
    }

    /// Enters a scope in the call graph.
    pub(crate) fn enter(&mut self, location: &'static Location<'static>, index: usize) -> CallId {
        self.push(Some(location), index)
    }

    /// Exits a scope previously entered with `enter`.
    ///
    /// Returns `false` if there was no scope to exit.
    pub(crate) fn exit(&mut self) -> bool {
        self.frames.pop().is_some()
    }

    /// Returns the `CallId` of the current scope.
    pub(crate) fn current(&self) -> CallId {
        self.frames.last().map_or(CallId::DUMMY, |frame| frame.id)
    }

    /// Returns the source location and index of the current scope, for diagnostics.
    ///
    /// Returns `None` in the root scope.
    pub(crate) fn current_site(&self) -> Option<(&'static Location<'static>, usize)> {
        let frame = self.frames.last()?;
        frame.location.map(|location| (location, frame.index))
    }

    /// Returns the number of scopes currently entered.
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns whether the stack is empty.
    ///
    /// The stack is empty just after creation, and when `enter` and `exit` calls are balanced.
    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_depend_on_location_index_and_parent() {
        let here = Location::caller();
        let mut stack = CallIdStack::new();

        let a = stack.enter(here, 0);
        let a0 = stack.enter(here, 0);
        stack.exit();
        let a1 = stack.enter(here, 1);
        stack.exit();
        stack.exit();
        assert!(stack.is_empty());

        let b = stack.enter(here, 0);
        let b0 = stack.enter(here, 0);
        stack.exit();
        stack.exit();

        // same path, same id
        assert_eq!(a, b);
        assert_eq!(a0, b0);
        // different index or depth, different id
        assert_ne!(a0, a1);
        assert_ne!(a, a0);
    }

    #[test]
    fn root_scope_has_no_location() {
        let here = Location::caller();
        let mut stack = CallIdStack::new();
        let root = stack.enter_root();
        assert!(stack.current_site().is_none());
        let child = stack.enter(here, 3);
        assert_eq!(stack.current_site(), Some((here, 3)));
        assert_ne!(root, child);
        stack.exit();
        stack.exit();

        let mut other = CallIdStack::new();
        assert_eq!(other.enter_root(), root);
    }

    #[test]
    fn exit_on_empty_stack_reports_it() {
        let mut stack = CallIdStack::new();
        assert!(!stack.exit());
        assert_eq!(stack.current(), CallId::DUMMY);
    }
}
