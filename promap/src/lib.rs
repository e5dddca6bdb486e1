//! Projected states: focused, independently updatable views over a single piece of state.
//!
//! A root `ProjectedState` wraps a state variable owned by a composition cache
//! (`promap_compose::Cache`). `ProjectedState::project` narrows it to a derived value through an
//! inward function and an outward function; updates made through the derived state are
//! translated back, level by level, into updates of the root. Projections compose: projecting
//! twice is the same as projecting once with the composed functions.
//!
//! ```
//! use promap::{create_projected_state, Cache};
//!
//! #[derive(Clone, Debug, promap::Data)]
//! #[data(crate = "promap")]
//! struct Person {
//!     age: u32,
//! }
//!
//! let mut cache = Cache::new(dummy_waker::dummy_waker());
//! let mut render = || {
//!     let person = create_projected_state(Person { age: 20 });
//!     person.project(|p| p.age, |p, age| Person { age, ..p.clone() })
//! };
//!
//! let age = cache.run(&mut render);
//! age.update(|age| age + 10);
//! assert!(cache.is_dirty());
//! assert_eq!(*cache.run(&mut render).value(), 30);
//! ```
//!
//! The `Data` derive refers to `promap_common` by default. Crates that only depend on `promap`
//! point it to the re-export with `#[data(crate = "promap")]`.
extern crate self as promap;

mod lens;
mod memo;
mod projected;
mod root;
mod update;

pub use lens::{lens, FnLens, IdentityLens, Lens, LensCompose, VecLens};
pub use memo::{BySerialized, ByValue, Deps, Fresh, Memo};
pub use projected::{ProjectedState, Store};
pub use root::{create_projected_state, create_projected_state_with, with_projected_state, with_projected_state_memo};
pub use update::{Acceptor, Rule, Update};

// promap-common reexports
pub use promap_common::Data;

// promap-compose reexports
pub use promap_compose::{cache_cx, Cache, CacheConfig, State};
