//! Updates accepted by projected states.
use std::{fmt, rc::Rc};

/// An update to a value: either a replacement value or a function of the current value.
pub enum Update<T> {
    /// Replace the value outright.
    Set(T),
    /// Compute the new value from the current one.
    Modify(Box<dyn FnOnce(&T) -> T>),
}

impl<T> Update<T> {
    /// Creates an update that computes the new value from the current one.
    pub fn modify(f: impl FnOnce(&T) -> T + 'static) -> Update<T> {
        Update::Modify(Box::new(f))
    }

    /// Returns the new value given the current one.
    pub fn apply(self, current: &T) -> T {
        match self {
            Update::Set(value) => value,
            Update::Modify(f) => f(current),
        }
    }
}

impl<T> From<T> for Update<T> {
    fn from(value: T) -> Self {
        Update::Set(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Update::Set(value) => f.debug_tuple("Set").field(value).finish(),
            Update::Modify(_) => f.write_str("Modify(..)"),
        }
    }
}

/// An update rule as seen by the owner of a value.
///
/// Receives the value current at the time the rule is applied. Returns `None` if the value
/// should be left as is, in which case no new value is built and nobody is notified.
pub type Rule<T> = Box<dyn FnOnce(&T) -> Option<T>>;

/// The function through which a projected state forwards update rules to the owner of its value.
pub type Acceptor<T> = Rc<dyn Fn(Rule<T>)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_ignores_current_value() {
        let update: Update<i32> = 5.into();
        assert_eq!(update.apply(&1), 5);
    }

    #[test]
    fn modify_sees_current_value() {
        let update = Update::modify(|v: &Vec<u8>| {
            let mut v = v.clone();
            v.push(3);
            v
        });
        assert_eq!(update.apply(&vec![1, 2]), vec![1, 2, 3]);
        assert_eq!(format!("{:?}", Update::<u8>::modify(|v| *v)), "Modify(..)");
        assert_eq!(format!("{:?}", Update::Set(4u8)), "Set(4)");
    }
}
