//! Positional memoization cache: the host environment for projected states.
//!
//! A function run with `Cache::run` can create state variables and memoize values at its call
//! sites. Those persist across runs, so that the function behaves like a component that is
//! re-evaluated whenever its state changes.
mod cache;
pub mod cache_cx;
mod call_id;
mod error;
mod state;

pub use cache::{Cache, CacheConfig, CacheVar};
pub use call_id::CallId;
pub use error::Error;
pub use state::State;

#[cfg(test)]
mod tests {
    use crate::{cache_cx as ccx, Cache, CacheConfig, CacheVar, Error, State};
    use std::{
        cell::Cell,
        panic::{self, AssertUnwindSafe},
        rc::Rc,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        task::{Wake, Waker},
    };

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingWaker {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn counting_cache() -> (Cache, Arc<CountingWaker>) {
        let counter = Arc::new(CountingWaker::default());
        (Cache::new(Waker::from(counter.clone())), counter)
    }

    //==================================================
    fn composable() -> Rc<CacheVar<u32>> {
        ccx::scoped(0, || ccx::variable(|| 42u32).0)
    }

    fn composable2(var: Rc<CacheVar<u32>>) -> u32 {
        ccx::memoize((), move || {
            // introduce a dependency on the value of the variable by reading from it
            var.set_dependency();
            var.get() + 1
        })
    }

    fn main_composable() -> (Rc<CacheVar<u32>>, u32) {
        ccx::scoped(0, || {
            let var = composable();
            let plus_one = composable2(var.clone());
            (var, plus_one)
        })
    }

    //==================================================
    #[test]
    fn memoized_value_follows_variable() {
        init_tracing();
        let mut cache = Cache::new(dummy_waker::dummy_waker());

        let (var, plus_one) = cache.run(main_composable);
        assert_eq!(var.get(), 42);
        assert_eq!(plus_one, 43);

        var.replace(63, true);
        assert!(cache.is_dirty());
        let (var, plus_one) = cache.run(main_composable);
        assert_eq!(var.get(), 63);
        assert_eq!(plus_one, 64);
        assert!(!cache.is_dirty());

        let (var, plus_one) = cache.run(main_composable);
        assert_eq!(var.get(), 63);
        assert_eq!(plus_one, 64);
        cache.dump();
    }

    #[test]
    fn memoize_reruns_only_when_arguments_change() {
        let mut cache = Cache::new(dummy_waker::dummy_waker());
        let calls = Cell::new(0);
        let mut run = |arg: u32| {
            cache.run(|| {
                ccx::memoize(arg, || {
                    calls.set(calls.get() + 1);
                    arg * 2
                })
            })
        };

        assert_eq!(run(1), 2);
        assert_eq!(run(1), 2);
        assert_eq!(calls.get(), 1);
        assert_eq!(run(2), 4);
        assert_eq!(calls.get(), 2);
        assert_eq!(run(2), 4);
        assert_eq!(calls.get(), 2);
    }

    fn counter_state() -> State<u32> {
        State::new(|| 1)
    }

    #[test]
    fn state_writes_wake_the_cache_owner() {
        let (mut cache, waker) = counting_cache();
        let state = cache.run(|| {
            let state = counter_state();
            state.get();
            state
        });
        assert!(!cache.is_dirty());

        // same value: nothing to do
        assert!(!state.set(1));
        assert_eq!(waker.count(), 0);
        assert!(!cache.is_dirty());

        assert!(state.set(2));
        assert_eq!(waker.count(), 1);
        assert!(cache.is_dirty());

        assert!(state.update(|v| v + 1));
        assert_eq!(state.get(), 3);
        assert_eq!(waker.count(), 2);

        let state2 = cache.run(counter_state);
        assert!(state.ptr_eq(&state2));
        assert_eq!(state2.get(), 3);
    }

    #[test]
    fn state_apply_sees_latest_value() {
        let mut cache = Cache::new(dummy_waker::dummy_waker());
        let state = cache.run(|| State::new(|| 10i32));
        state.apply(|v| Some(v + 1));
        state.apply(|v| Some(v * 2));
        assert!(!state.apply(|_| None));
        assert_eq!(state.get(), 22);
        assert_eq!(state.take(), 22);
        assert_eq!(state.get(), 0);
    }

    #[test]
    fn unvisited_call_sites_are_dropped() {
        let mut cache = Cache::new(dummy_waker::dummy_waker());
        let mut run = |show_second: bool| {
            cache.run(|| {
                let first = State::new(|| "first".to_string());
                let second = if show_second {
                    Some(State::new(|| "second".to_string()))
                } else {
                    None
                };
                (first, second)
            });
            cache.len()
        };

        assert_eq!(run(true), 3);
        assert_eq!(run(false), 2);
        assert_eq!(run(true), 3);
    }

    fn item_state(item: u32) -> State<u32> {
        ccx::scoped(item, || State::new(|| item * 10))
    }

    #[test]
    fn keyed_scopes_survive_reordering() {
        use rand::seq::SliceRandom;

        let mut cache = Cache::new(dummy_waker::dummy_waker());
        let mut rng = rand::thread_rng();
        let mut items: Vec<u32> = (0..8).collect();

        let states = cache.run(|| {
            items
                .iter()
                .map(|&item| item_state(item))
                .collect::<Vec<_>>()
        });
        for state in states.iter() {
            state.update(|v| v + 1);
        }

        for _ in 0..4 {
            items.shuffle(&mut rng);
            let values = cache.run(|| {
                items
                    .iter()
                    .map(|&item| item_state(item).get())
                    .collect::<Vec<_>>()
            });
            let expected: Vec<u32> = items.iter().map(|item| item * 10 + 1).collect();
            assert_eq!(values, expected);
            assert_eq!(cache.len(), 9);
        }
    }

    #[test]
    fn changed_once_and_run_if_changed() {
        let mut cache = Cache::new(dummy_waker::dummy_waker());
        let counter = Cell::new(0);
        let mut run = |value: i32| {
            cache.run(|| {
                let changed = ccx::changed(value);
                let revision = ccx::revision();
                let first_revision = ccx::once(|| revision);
                let ran = ccx::run_if_changed(value, || counter.set(counter.get() + 1)).is_some();
                (changed, first_revision, ran)
            })
        };

        assert_eq!(run(1), (true, 1, true));
        assert_eq!(run(1), (false, 1, false));
        assert_eq!(run(2), (true, 1, true));
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn writes_during_a_pass_rerun_it() {
        let mut cache = Cache::new(dummy_waker::dummy_waker());
        let value = cache.run(|| {
            let state = State::new(|| 0u32);
            let value = state.get();
            if value < 3 {
                state.set(value + 1);
            }
            value
        });
        assert_eq!(value, 3);
        assert_eq!(cache.revision(), 4);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn reruns_are_bounded() {
        let mut cache = Cache::with_config(dummy_waker::dummy_waker(), CacheConfig { max_reruns: 2 });
        let passes = Cell::new(0);
        cache.run(|| {
            passes.set(passes.get() + 1);
            let state = State::new(|| 0u64);
            let value = state.get();
            state.set(value + 1);
        });
        assert_eq!(passes.get(), 3);
        assert!(cache.is_dirty());
    }

    #[test]
    fn context_functions_fail_outside_of_run() {
        assert!(!ccx::is_composing());
        assert_eq!(ccx::try_variable(|| 0u8).unwrap_err(), Error::OutsideComposition);
        assert_eq!(ccx::try_memoize((), || 0u8).unwrap_err(), Error::OutsideComposition);
        assert!(ccx::current_location().is_none());
    }

    #[test]
    fn type_mismatch_at_a_call_site_is_reported() {
        fn site<T: 'static>(init: T) -> Result<Rc<CacheVar<T>>, Error> {
            ccx::try_variable(move || init).map(|(var, _)| var)
        }

        let mut cache = Cache::new(dummy_waker::dummy_waker());
        assert!(cache.run(|| site(1u32)).is_ok());
        let err = cache.run(|| site("text".to_string())).unwrap_err();
        assert!(matches!(err, Error::VariableTypeMismatch(_)));
        // the stale variable is gone, the next pass recreates it
        assert!(cache.run(|| site("text".to_string())).is_ok());
    }

    #[test]
    #[should_panic(expected = "cannot be called recursively")]
    fn nested_runs_panic() {
        let mut outer = Cache::new(dummy_waker::dummy_waker());
        let mut inner = Cache::new(dummy_waker::dummy_waker());
        outer.run(|| inner.run(|| ()));
    }

    #[test]
    fn panicking_pass_leaves_the_thread_clean() {
        init_tracing();
        let mut cache = Cache::new(dummy_waker::dummy_waker());
        assert_eq!(cache.run(|| State::new(|| 1u8).get()), 1);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            cache.run(|| {
                let _state = State::new(|| 1u8);
                panic!("interrupted");
            })
        }));
        assert!(result.is_err());
        assert!(!ccx::is_composing());

        // other caches can run on this thread
        let mut other = Cache::new(dummy_waker::dummy_waker());
        assert_eq!(other.run(|| State::new(|| 2u8).get()), 2);

        // the interrupted cache starts over
        assert_eq!(cache.run(|| State::new(|| 3u8).get()), 3);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn rejected_nested_run_keeps_its_cache() {
        let mut outer = Cache::new(dummy_waker::dummy_waker());
        let mut inner = Cache::new(dummy_waker::dummy_waker());
        inner.run(counter_state).set(5);

        let result = panic::catch_unwind(AssertUnwindSafe(|| outer.run(|| inner.run(|| ()))));
        assert!(result.is_err());
        assert!(!ccx::is_composing());
        assert_eq!(inner.run(counter_state).get(), 5);
        assert_eq!(inner.revision(), 2);
    }

    #[test]
    fn root_scope_has_no_location() {
        let mut cache = Cache::new(dummy_waker::dummy_waker());
        assert!(cache.run(ccx::current_location).is_none());
        let location = cache.run(|| ccx::scoped(0, ccx::current_location));
        assert_eq!(location.map(|location| location.file()), Some(file!()));
    }
}
