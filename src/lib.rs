#![no_std]
#![allow(unused_unsafe)]
//! A non-thread-safe reference-counted handle.
//!
//! Every [`SharedHandle`] belongs to an *ownership group*: the set of handles sharing one
//! resource and one [`Counter`]. Cloning a handle joins its group, assigning a fresh resource
//! leaves the old group and starts a new one. The resource is dropped exactly once, by whichever
//! handle leaves its group last.
extern crate alloc;
extern crate maybe_std as base;

#[cfg(test)]
extern crate std;

/// A smart pointer that keeps track of how many pointers refer to the same allocation and
/// exposes this information in its API.
pub trait ReferenceCounted<T: ?Sized>: Clone {
    /// Get the number of owning pointers referring to the same allocation.
    ///
    /// Implementations must fulfill that `ReferenceCounted::reference_count(this) == 1` implies
    /// that `this` is the only pointer able to reach the allocation.
    fn reference_count(this: &Self) -> usize;
}

mod counter;
pub use counter::Counter;

#[cfg(feature = "handle")]
mod handle;
#[cfg(feature = "handle")]
pub use handle::*;
