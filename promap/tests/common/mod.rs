#![allow(dead_code)]
use promap::{Data, Rule, Store};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Wake, Waker},
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A waker that counts how many times it was woken.
#[derive(Default)]
pub struct CountingWaker(AtomicUsize);

impl Wake for CountingWaker {
    fn wake(self: Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl CountingWaker {
    pub fn new() -> (Arc<CountingWaker>, Waker) {
        let counter = Arc::new(CountingWaker::default());
        let waker = Waker::from(counter.clone());
        (counter, waker)
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// A store outside of any composition cache: a shared cell that counts its writes.
pub struct SharedCell<T> {
    value: Rc<RefCell<Rc<T>>>,
    writes: Rc<Cell<usize>>,
}

impl<T> Clone for SharedCell<T> {
    fn clone(&self) -> Self {
        SharedCell {
            value: self.value.clone(),
            writes: self.writes.clone(),
        }
    }
}

impl<T> SharedCell<T> {
    pub fn new(value: T) -> SharedCell<T> {
        SharedCell {
            value: Rc::new(RefCell::new(Rc::new(value))),
            writes: Rc::new(Cell::new(0)),
        }
    }

    /// Returns the current value. Every write stores a new `Rc`, so identity tracks writes.
    pub fn snapshot(&self) -> Rc<T> {
        self.value.borrow().clone()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl<T: 'static> Store<Rc<T>> for SharedCell<T> {
    fn current(&self) -> Rc<T> {
        self.snapshot()
    }

    fn apply(&self, rule: Rule<Rc<T>>) {
        let new_value = rule(&self.snapshot());
        if let Some(new_value) = new_value {
            *self.value.borrow_mut() = new_value;
            self.writes.set(self.writes.get() + 1);
        }
    }
}

/// Record used by most tests.
#[derive(Clone, Debug, PartialEq, Data, serde::Serialize)]
#[data(crate = "promap")]
pub struct Person {
    pub name: String,
    pub age: u32,
}

impl Person {
    pub fn new(name: &str, age: u32) -> Person {
        Person {
            name: name.to_string(),
            age,
        }
    }
}

/// Outward function for the `age` field.
pub fn with_age(person: &Person, age: u32) -> Person {
    Person {
        age,
        ..person.clone()
    }
}

/// Outward function for the `name` field.
pub fn with_name(person: &Person, name: String) -> Person {
    Person {
        name,
        ..person.clone()
    }
}

/// Same as above, over shared values.
pub fn rc_with_age(person: &Rc<Person>, age: u32) -> Rc<Person> {
    Rc::new(with_age(person, age))
}

pub fn rc_with_name(person: &Rc<Person>, name: String) -> Rc<Person> {
    Rc::new(with_name(person, name))
}
