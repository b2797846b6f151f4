use base::cell::Cell;

/// The shared count of an ownership group.
///
/// A `Counter` is never copied: every group has exactly one, reached by pointer from each of its
/// handles. The count is a plain `Cell`, so it must not be touched from more than one thread.
#[derive(Debug, Default)]
pub struct Counter {
    count: Cell<usize>,
}

impl Counter {
    /// Creates a counter at zero.
    pub const fn new() -> Self {
        Counter { count: Cell::new(0) }
    }

    pub fn reset(&self) {
        self.count.set(0);
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.count.get()
    }

    /// Adds one to the count.
    ///
    /// # Panics
    ///
    /// Panics if the count would overflow, which can only happen when handles are leaked with
    /// `mem::forget`.
    #[inline]
    pub fn increment(&self) {
        let count = self.get();
        if count == usize::MAX {
            panic!("reference count overflow");
        }
        self.count.set(count + 1);
    }

    /// Subtracts one from the count.
    ///
    /// The caller must not decrement a counter that is already at zero.
    #[inline]
    pub fn decrement(&self) {
        let count = self.get();
        debug_assert!(count != 0, "decremented a zero reference count");
        self.count.set(count.wrapping_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::Counter;

    #[test]
    fn starts_at_zero() {
        assert_eq!(Counter::new().get(), 0);
        assert_eq!(Counter::default().get(), 0);
    }

    #[test]
    fn increment_and_decrement() {
        let counter = Counter::new();
        counter.increment();
        counter.increment();
        counter.increment();
        assert_eq!(counter.get(), 3);

        counter.decrement();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn reset_clears_count() {
        let counter = Counter::new();
        counter.increment();
        counter.increment();
        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    #[should_panic(expected = "reference count overflow")]
    fn increment_panics_on_overflow() {
        let counter = Counter::new();
        counter.count.set(usize::MAX);
        counter.increment();
    }
}
