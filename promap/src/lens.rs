//! Lenses: reified accessor pairs.
//!
//! A lens over a type `T` gives access to a part of type `S` of a `T`: `get` extracts the part,
//! `set` builds a new `T` from the previous `T` and a new part. Lenses never modify the value
//! they are given.
use std::marker::PhantomData;

/// Trait implemented by "lens" types, which act like a reified accessor for some "child" part of
/// type `S` of a "parent" value of type `T`.
pub trait Lens<T, S> {
    /// Extracts the part from the parent value.
    fn get(&self, outer: &T) -> S;

    /// Returns a copy of `outer` where the part has been replaced by `inner`.
    fn set(&self, outer: &T, inner: S) -> T;

    /// Lens composition.
    fn compose<L, U>(self, rhs: L) -> LensCompose<Self, L, S>
    where
        Self: Sized,
        L: Lens<S, U>,
    {
        LensCompose(self, rhs, PhantomData)
    }
}

/// Identity lens.
#[derive(Copy, Clone, Debug, Default)]
pub struct IdentityLens;

impl<T: Clone> Lens<T, T> for IdentityLens {
    fn get(&self, outer: &T) -> T {
        outer.clone()
    }

    fn set(&self, _outer: &T, inner: T) -> T {
        inner
    }
}

/// Lens composition: combines `Lens<T,S>` and `Lens<S,U>` to `Lens<T,U>`.
///
/// Equivalent to applying two lenses in succession.
#[derive(Debug)]
pub struct LensCompose<K, L, S>(pub K, pub L, pub PhantomData<fn() -> S>);

// #26925
impl<K: Clone, L: Clone, S> Clone for LensCompose<K, L, S> {
    fn clone(&self) -> Self {
        LensCompose(self.0.clone(), self.1.clone(), PhantomData)
    }
}

impl<K, L, T, S, U> Lens<T, U> for LensCompose<K, L, S>
where
    K: Lens<T, S>,
    L: Lens<S, U>,
{
    fn get(&self, outer: &T) -> U {
        self.1.get(&self.0.get(outer))
    }

    fn set(&self, outer: &T, inner: U) -> T {
        let middle = self.0.get(outer);
        let middle = self.1.set(&middle, inner);
        self.0.set(outer, middle)
    }
}

/// A lens built from a pair of functions.
#[derive(Copy, Clone)]
pub struct FnLens<G, F> {
    get: G,
    set: F,
}

impl<T, S, G, F> Lens<T, S> for FnLens<G, F>
where
    G: Fn(&T) -> S,
    F: Fn(&T, S) -> T,
{
    fn get(&self, outer: &T) -> S {
        (self.get)(outer)
    }

    fn set(&self, outer: &T, inner: S) -> T {
        (self.set)(outer, inner)
    }
}

/// Creates a lens from an inward function and an outward function.
///
/// `set` receives the previous outer value first and the new inner value second.
pub fn lens<T, S, G, F>(get: G, set: F) -> FnLens<G, F>
where
    G: Fn(&T) -> S,
    F: Fn(&T, S) -> T,
{
    FnLens { get, set }
}

/// A lens that looks at a particular item in a vector.
///
/// It implements `Lens<Vec<T>,Option<T>>`. `get` returns `None` when the index is out of range.
/// `set` replaces the item when given `Some` and the index is in range; otherwise it returns the
/// vector unchanged, so a projection that outlived a shrinking of the list never panics.
#[derive(Debug)]
pub struct VecLens<T> {
    index: usize,
    _phantom: PhantomData<fn() -> T>,
}

// #26925
impl<T> Clone for VecLens<T> {
    fn clone(&self) -> Self {
        VecLens {
            index: self.index,
            _phantom: PhantomData,
        }
    }
}

impl<T> VecLens<T> {
    pub fn new(index: usize) -> VecLens<T> {
        VecLens {
            index,
            _phantom: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T: Clone> Lens<Vec<T>, Option<T>> for VecLens<T> {
    fn get(&self, outer: &Vec<T>) -> Option<T> {
        outer.get(self.index).cloned()
    }

    fn set(&self, outer: &Vec<T>, inner: Option<T>) -> Vec<T> {
        let mut items = outer.clone();
        if let (Some(slot), Some(inner)) = (items.get_mut(self.index), inner) {
            *slot = inner;
        }
        items
    }
}

/// Creates a lens that accesses a field of a struct.
///
/// ```
/// #[derive(Clone)]
/// struct Person {
///     age: u32,
/// }
///
/// use promap::Lens;
/// let age = promap::field_lens!(Person => age);
/// let older = age.set(&Person { age: 20 }, 30);
/// assert_eq!(age.get(&older), 30);
/// ```
#[macro_export]
macro_rules! field_lens {
    ($t:ty => $field:ident) => {
        $crate::lens(
            |outer: &$t| ::std::clone::Clone::clone(&outer.$field),
            |outer: &$t, inner| {
                let mut outer = ::std::clone::Clone::clone(outer);
                outer.$field = inner;
                outer
            },
        )
    };
}
