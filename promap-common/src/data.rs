// Copyright 2019 The Druid Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Traits for handling value types.
//!
//! `Data` is the change-detection primitive used by the composition cache and by projected
//! states: two values that are `same` are considered unchanged, and nothing downstream of them
//! is recomputed or notified.

use std::{ptr, rc::Rc, sync::Arc};

/// A value that can be cheaply compared with a previous version of itself.
///
/// `same` must be an equivalence relation. For plain data it is structural equality; for shared
/// pointers (`Rc`, `Arc`) it is pointer identity, which makes copy-on-write structures cheap to
/// compare.
pub trait Data: Clone + 'static {
    fn same(&self, other: &Self) -> bool;
}

/// Implements `Data` with `==` for types that implement `Eq` (or something close enough).
macro_rules! impl_data_simple {
    ($($t:ty),* $(,)?) => {
        $(
            impl Data for $t {
                fn same(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

impl_data_simple!(i8, i16, i32, i64, i128, isize);
impl_data_simple!(u8, u16, u32, u64, u128, usize);
impl_data_simple!(char, bool, String);
impl_data_simple!(
    std::num::NonZeroI8,
    std::num::NonZeroI16,
    std::num::NonZeroI32,
    std::num::NonZeroI64,
    std::num::NonZeroI128,
    std::num::NonZeroIsize,
    std::num::NonZeroU8,
    std::num::NonZeroU16,
    std::num::NonZeroU32,
    std::num::NonZeroU64,
    std::num::NonZeroU128,
    std::num::NonZeroUsize,
);
impl_data_simple!(std::time::SystemTime, std::time::Instant, std::time::Duration);
impl_data_simple!(std::path::PathBuf, std::io::ErrorKind, std::ops::RangeFull);
impl_data_simple!(
    std::net::Ipv4Addr,
    std::net::Ipv6Addr,
    std::net::SocketAddrV4,
    std::net::SocketAddrV6,
    std::net::IpAddr,
    std::net::SocketAddr,
);

impl Data for &'static str {
    fn same(&self, other: &Self) -> bool {
        ptr::eq(*self, *other)
    }
}

// Floats compare by bit pattern: NaN is the same as itself, 0.0 and -0.0 are different.
impl Data for f32 {
    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl Data for f64 {
    fn same(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl<T: ?Sized + 'static> Data for Arc<T> {
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: ?Sized + 'static> Data for std::sync::Weak<T> {
    fn same(&self, other: &Self) -> bool {
        std::sync::Weak::ptr_eq(self, other)
    }
}

impl<T: ?Sized + 'static> Data for Rc<T> {
    fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized + 'static> Data for std::rc::Weak<T> {
    fn same(&self, other: &Self) -> bool {
        std::rc::Weak::ptr_eq(self, other)
    }
}

impl<T: Data> Data for Option<T> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Data, U: Data> Data for Result<T, U> {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Ok(a), Ok(b)) => a.same(b),
            (Err(a), Err(b)) => a.same(b),
            _ => false,
        }
    }
}

impl<T: Data> Data for Vec<T> {
    fn same(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a.same(b))
    }
}

impl<T: Data> Data for Box<T> {
    fn same(&self, other: &Self) -> bool {
        (**self).same(&**other)
    }
}

impl<T: Data, const N: usize> Data for [T; N] {
    fn same(&self, other: &Self) -> bool {
        self.iter().zip(other.iter()).all(|(a, b)| a.same(b))
    }
}

impl Data for () {
    fn same(&self, _other: &Self) -> bool {
        true
    }
}

macro_rules! impl_data_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Data),+> Data for ($($name,)+) {
            fn same(&self, other: &Self) -> bool {
                $(self.$idx.same(&other.$idx))&&+
            }
        }
    };
}

impl_data_tuple!(T0: 0);
impl_data_tuple!(T0: 0, T1: 1);
impl_data_tuple!(T0: 0, T1: 1, T2: 2);
impl_data_tuple!(T0: 0, T1: 1, T2: 2, T3: 3);
impl_data_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4);
impl_data_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5);

impl<T: 'static + ?Sized> Data for std::marker::PhantomData<T> {
    fn same(&self, _other: &Self) -> bool {
        // zero-sized types
        true
    }
}

impl<T: 'static> Data for std::mem::Discriminant<T> {
    fn same(&self, other: &Self) -> bool {
        *self == *other
    }
}

impl<T: Data> Data for std::num::Wrapping<T> {
    fn same(&self, other: &Self) -> bool {
        self.0.same(&other.0)
    }
}

impl<T: Data> Data for std::ops::Range<T> {
    fn same(&self, other: &Self) -> bool {
        self.start.same(&other.start) && self.end.same(&other.end)
    }
}

impl<T: Data> Data for std::ops::RangeFrom<T> {
    fn same(&self, other: &Self) -> bool {
        self.start.same(&other.start)
    }
}

impl<T: Data> Data for std::ops::RangeInclusive<T> {
    fn same(&self, other: &Self) -> bool {
        self.start().same(other.start()) && self.end().same(other.end())
    }
}

impl<T: Data> Data for std::ops::RangeTo<T> {
    fn same(&self, other: &Self) -> bool {
        self.end.same(&other.end)
    }
}

impl<T: Data> Data for std::ops::RangeToInclusive<T> {
    fn same(&self, other: &Self) -> bool {
        self.end.same(&other.end)
    }
}

impl<T: Data> Data for std::ops::Bound<T> {
    fn same(&self, other: &Self) -> bool {
        use std::ops::Bound::*;
        match (self, other) {
            (Included(a), Included(b)) | (Excluded(a), Excluded(b)) => a.same(b),
            (Unbounded, Unbounded) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Data;
    use std::rc::Rc;

    #[test]
    fn array_data() {
        let input = [1u8, 0, 0, 1, 0];
        assert!(input.same(&[1u8, 0, 0, 1, 0]));
        assert!(!input.same(&[1u8, 1, 0, 1, 0]));
    }

    #[test]
    fn vec_compares_lengths_and_elements() {
        assert!(vec![1, 2, 3].same(&vec![1, 2, 3]));
        assert!(!vec![1, 2, 3].same(&vec![1, 2]));
        assert!(!vec![1, 2, 3].same(&vec![1, 2, 4]));
    }

    #[test]
    fn floats_compare_bitwise() {
        assert!(f64::NAN.same(&f64::NAN));
        assert!(!0.0f64.same(&-0.0));
        assert!(1.5f32.same(&1.5));
    }

    #[test]
    fn rc_is_compared_by_identity() {
        let a = Rc::new(vec![1, 2]);
        let b = Rc::new(vec![1, 2]);
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
    }

    #[test]
    fn tuples_and_options() {
        assert!((1, "x".to_string(), Some(2.0f32)).same(&(1, "x".to_string(), Some(2.0))));
        assert!(!(1, 2).same(&(1, 3)));
        assert!(!Some(1).same(&None));
    }

    #[derive(Clone, Debug, promap_common::Data)]
    struct Person {
        name: String,
        age: u32,
        #[data(ignore)]
        visits: u64,
    }

    #[derive(Clone, Debug, PartialEq, promap_common::Data)]
    enum Mode {
        Idle,
        Busy,
    }

    #[derive(Clone, Debug, promap_common::Data)]
    enum Shape {
        Circle(f64),
        Rect { w: f64, h: f64 },
        Empty,
    }

    #[test]
    fn derived_struct_skips_ignored_fields() {
        let a = Person {
            name: "ann".into(),
            age: 20,
            visits: 1,
        };
        let b = Person { visits: 99, ..a.clone() };
        let c = Person { age: 21, ..a.clone() };
        assert!(a.same(&b));
        assert!(!a.same(&c));
    }

    #[test]
    fn derived_enums() {
        assert!(Mode::Idle.same(&Mode::Idle));
        assert!(!Mode::Idle.same(&Mode::Busy));
        assert!(Shape::Circle(1.0).same(&Shape::Circle(1.0)));
        assert!(!Shape::Circle(1.0).same(&Shape::Empty));
        assert!(Shape::Rect { w: 1.0, h: 2.0 }.same(&Shape::Rect { w: 1.0, h: 2.0 }));
        assert!(!Shape::Rect { w: 1.0, h: 2.0 }.same(&Shape::Rect { w: 1.0, h: 3.0 }));
        assert!(Shape::Empty.same(&Shape::Empty));
    }

    /// A crate that re-exports `Data` under another name.
    mod facade {
        pub use crate::Data;
    }

    /// A trait of the same shape, unrelated to `Data`.
    mod lookalike {
        pub trait Data {
            fn same(&self, other: &Self) -> bool;
        }

        impl Data for u32 {
            fn same(&self, other: &Self) -> bool {
                self == other
            }
        }
    }

    #[derive(Clone, promap_common::Data)]
    #[data(crate = "self::facade")]
    struct Tagged<T> {
        tag: T,
        #[data(ignore)]
        note: String,
    }

    #[derive(promap_common::Data)]
    #[data(crate = "self::lookalike")]
    struct Counter {
        count: u32,
    }

    #[test]
    fn derive_targets_the_given_crate_path() {
        let a = Tagged {
            tag: 1u8,
            note: "a".into(),
        };
        let b = Tagged {
            note: "b".into(),
            ..a.clone()
        };
        assert!(a.same(&b));
        assert!(!a.same(&Tagged { tag: 2u8, ..b }));

        let one = Counter { count: 1 };
        assert!(lookalike::Data::same(&one, &Counter { count: 1 }));
        assert!(!lookalike::Data::same(&one, &Counter { count: 2 }));
    }
}
