use std::sync::{Mutex, MutexGuard, PoisonError};

/// A value behind its own mutex that is only ever read by copy.
///
/// Writers replace or edit the value inside a single critical section, so a
/// reader sees the state either before or after an update, never in between.
/// The lock is held only for the copy or the edit; callers never get a guard.
#[derive(Debug, Default)]
pub struct GuardedCell<T> {
    value: Mutex<T>,
}

impl<T: Clone> GuardedCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    /// Point-in-time copy of the value.
    pub fn get(&self) -> T {
        self.lock().clone()
    }

    pub fn set(&self, value: T) {
        *self.lock() = value;
    }

    /// Edits the value in place under the guard and returns the closure's result.
    ///
    /// The closure must not block: it runs while readers wait.
    pub fn update<R>(&self, edit: impl FnOnce(&mut T) -> R) -> R {
        edit(&mut self.lock())
    }

    // Poisoning is ignored; the stream loop must keep running after a writer panic.
    fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_get_returns_copy() {
        let cell = GuardedCell::new(vec![1, 2, 3]);
        let mut copy = cell.get();
        copy.push(4);
        assert_eq!(cell.get(), vec![1, 2, 3]);
    }

    #[test]
    fn test_set_replaces_value() {
        let cell = GuardedCell::new(1);
        cell.set(7);
        assert_eq!(cell.get(), 7);
    }

    #[test]
    fn test_update_returns_closure_result() {
        let cell = GuardedCell::new(10);
        let old = cell.update(|v| {
            let old = *v;
            *v += 5;
            old
        });
        assert_eq!(old, 10);
        assert_eq!(cell.get(), 15);
    }

    #[test]
    fn test_readers_never_observe_partial_repopulation() {
        let first: BTreeMap<String, usize> =
            [("person".to_string(), 2), ("dog".to_string(), 1)].into();
        let second: BTreeMap<String, usize> =
            [("car".to_string(), 3), ("bus".to_string(), 1), ("cat".to_string(), 4)].into();

        let cell = Arc::new(GuardedCell::new(first.clone()));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let cell = cell.clone();
            let (first, second) = (first.clone(), second.clone());
            let done = done.clone();
            thread::spawn(move || {
                for i in 0..2_000 {
                    let next = if i % 2 == 0 { &second } else { &first };
                    cell.update(|table| {
                        table.clear();
                        for (label, count) in next {
                            for _ in 0..*count {
                                *table.entry(label.clone()).or_insert(0) += 1;
                            }
                        }
                    });
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        while !done.load(Ordering::SeqCst) {
            let seen = cell.get();
            assert!(seen == first || seen == second, "torn read: {seen:?}");
        }
        writer.join().unwrap();
    }
}
