use alloc::boxed::Box;

use base::borrow;
use base::cmp::Ordering;
use base::convert::From;
use base::fmt;
use base::hash::{Hash, Hasher};
use base::marker::{PhantomData, Unpin};
use base::mem;
use base::ops::Deref;
use base::ptr::{self, NonNull};

use log::trace;

use crate::counter::Counter;
use crate::ReferenceCounted;

/// A non-thread-safe reference-counted handle to a nullable, heap-allocated resource.
///
/// Handles that share a resource form an *ownership group* and share one [`Counter`]. Cloning a
/// handle (or `clone_from` another one) joins that group. [`SharedHandle::assign`] leaves the
/// current group and makes the handle the sole owner of a new resource; it never merges groups.
/// The resource is dropped when the count of its group reaches zero.
///
/// An unbound handle (one without a resource) reports a count of zero and owns a private counter
/// that no other handle shares.
pub struct SharedHandle<T: ?Sized> {
    resource: Option<NonNull<T>>,
    counter: NonNull<Counter>,
    phantom: PhantomData<T>,
}

fn fresh_counter() -> NonNull<Counter> {
    NonNull::from(Box::leak(Box::new(Counter::new())))
}

impl<T: ?Sized> SharedHandle<T> {
    /// Creates a handle owning `resource`, or an unbound handle if it is `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let five = SharedHandle::new(Some(Box::new(5)));
    /// assert_eq!(*five, 5);
    /// assert_eq!(five.reference_count(), 1);
    ///
    /// let nothing = SharedHandle::<i32>::new(None);
    /// assert!(nothing.as_ptr().is_null());
    /// assert_eq!(nothing.reference_count(), 0);
    /// ```
    pub fn new(resource: Option<Box<T>>) -> Self {
        let handle = SharedHandle {
            resource: resource.map(|resource| NonNull::from(Box::leak(resource))),
            counter: fresh_counter(),
            phantom: PhantomData,
        };
        if handle.resource.is_some() {
            handle.counter().increment();
            trace!("created ownership group {:p}", handle.counter);
        }
        handle
    }

    /// Creates an unbound handle.
    pub fn null() -> Self {
        Self::new(None)
    }

    #[inline]
    fn counter(&self) -> &Counter {
        // The counter stays allocated for as long as any handle of its group is alive.
        unsafe { self.counter.as_ref() }
    }

    /// Returns the number of handles in this handle's ownership group, or zero if unbound.
    #[inline]
    pub fn reference_count(&self) -> usize {
        self.counter().get()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.resource.is_none()
    }

    /// Returns `true` if both handles are members of the same ownership group.
    ///
    /// Distinct unbound handles never share a group.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.counter == other.counter
    }

    /// Returns a reference to the resource, or `None` if the handle is unbound.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.resource.map(|resource| unsafe { &*resource.as_ptr() })
    }

    /// Returns a mutable reference to the resource if this handle is its only owner.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.reference_count() == 1 {
            self.resource.map(|resource| unsafe { &mut *resource.as_ptr() })
        } else {
            None
        }
    }

    /// Takes the resource back out of the handle if it is the only owner.
    ///
    /// Otherwise the handle is returned unchanged, as is an unbound handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let a = SharedHandle::from_value(3);
    /// let b = a.clone();
    /// let a = SharedHandle::try_unwrap(a).unwrap_err();
    /// drop(b);
    /// assert_eq!(*SharedHandle::try_unwrap(a).unwrap(), 3);
    /// ```
    pub fn try_unwrap(this: Self) -> Result<Box<T>, Self> {
        match this.resource {
            Some(resource) if this.reference_count() == 1 => unsafe {
                trace!("unwrapped ownership group {:p}", this.counter);
                drop(Box::from_raw(this.counter.as_ptr()));
                mem::forget(this);
                Ok(Box::from_raw(resource.as_ptr()))
            },
            _ => Err(this),
        }
    }

    /// Makes this handle the sole owner of `resource`, or unbound if it is `None`.
    ///
    /// The handle leaves its current ownership group first, dropping the old resource if it was
    /// the last member. The new resource always gets a counter of its own, so former co-owners
    /// keep their group and only see their count drop by one.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// let mut h1 = SharedHandle::from_value(5);
    /// let h2 = h1.clone();
    /// h1.assign(Some(Box::new(9)));
    ///
    /// assert_eq!(*h1, 9);
    /// assert_eq!(*h2, 5);
    /// assert_eq!(h2.reference_count(), 1);
    /// ```
    pub fn assign(&mut self, resource: Option<Box<T>>) {
        let resource = resource.map(|resource| NonNull::from(Box::leak(resource)));
        self.rebind(resource, fresh_counter());
        if resource.is_some() {
            trace!("created ownership group {:p}", self.counter);
        }
    }

    /// Gives up this handle's share of the resource and leaves the handle unbound.
    ///
    /// The resource is dropped if this was the last handle owning it.
    pub fn detach(&mut self) {
        self.assign(None);
    }

    /// Leaves the current group and joins the one formed by `resource` and `counter`.
    ///
    /// The old group is destroyed only after the handle is bound to the new one.
    fn rebind(&mut self, resource: Option<NonNull<T>>, counter: NonNull<Counter>) {
        let (old_resource, old_counter) = (self.resource, self.counter);
        let emptied = unsafe { leave(old_resource, old_counter) };

        self.resource = resource;
        self.counter = counter;
        if resource.is_some() {
            self.counter().increment();
        }

        if emptied {
            unsafe { destroy(old_resource, old_counter) };
        }
    }
}

impl<T> SharedHandle<T> {
    /// Moves `value` to the heap and creates the sole handle owning it.
    pub fn from_value(value: T) -> Self {
        Self::new(Some(Box::new(value)))
    }

    /// Returns the managed resource without touching the count. Null for an unbound handle.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        match self.resource {
            Some(resource) => resource.as_ptr(),
            None => ptr::null(),
        }
    }
}

/// Takes one member out of a group, returning whether the group is now empty.
///
/// An unbound handle's counter is private to it, so leaving always empties it.
unsafe fn leave<T: ?Sized>(resource: Option<NonNull<T>>, counter: NonNull<Counter>) -> bool {
    match resource {
        Some(_) => {
            let counter = unsafe { counter.as_ref() };
            counter.decrement();
            counter.get() == 0
        }
        None => true,
    }
}

/// Frees the counter and drops the resource of an empty group.
unsafe fn destroy<T: ?Sized>(resource: Option<NonNull<T>>, counter: NonNull<Counter>) {
    if resource.is_some() {
        trace!("destroying ownership group {:p}", counter);
    }
    unsafe { drop(Box::from_raw(counter.as_ptr())) };
    if let Some(resource) = resource {
        unsafe { drop(Box::from_raw(resource.as_ptr())) };
    }
}

impl<T: ?Sized> Clone for SharedHandle<T> {
    /// Makes another handle in the same ownership group, incrementing the count.
    ///
    /// Cloning an unbound handle gives a new unbound handle.
    #[inline]
    fn clone(&self) -> Self {
        match self.resource {
            Some(_) => {
                self.counter().increment();
                SharedHandle {
                    resource: self.resource,
                    counter: self.counter,
                    phantom: PhantomData,
                }
            }
            None => Self::null(),
        }
    }

    /// Moves this handle into `source`'s ownership group.
    ///
    /// Nothing happens if both handles already share a group. Otherwise this handle leaves its
    /// current group, dropping the resource if it was the last member.
    fn clone_from(&mut self, source: &Self) {
        if self.resource == source.resource && self.counter == source.counter {
            trace!("clone_from within ownership group {:p}", self.counter);
            return;
        }
        match source.resource {
            Some(_) => self.rebind(source.resource, source.counter),
            None => self.rebind(None, fresh_counter()),
        }
    }
}

impl<T: ?Sized> Drop for SharedHandle<T> {
    /// Drops the handle.
    ///
    /// This will decrement the reference count, dropping the resource if this was the last
    /// handle owning it.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_handle::SharedHandle;
    ///
    /// struct Foo;
    ///
    /// impl Drop for Foo {
    ///     fn drop(&mut self) {
    ///         println!("dropped!");
    ///     }
    /// }
    ///
    /// let foo  = SharedHandle::from_value(Foo);
    /// let foo2 = foo.clone();
    ///
    /// drop(foo);    // Doesn't print anything
    /// drop(foo2);   // Prints "dropped!"
    /// ```
    fn drop(&mut self) {
        unsafe {
            if leave(self.resource, self.counter) {
                destroy(self.resource, self.counter);
            }
        }
    }
}

impl<T: ?Sized> Deref for SharedHandle<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is unbound.
    #[inline]
    fn deref(&self) -> &T {
        match self.get() {
            Some(resource) => resource,
            None => panic!("dereferenced an unbound SharedHandle"),
        }
    }
}

impl<T: ?Sized> borrow::Borrow<T> for SharedHandle<T> {
    fn borrow(&self) -> &T {
        &**self
    }
}

impl<T: ?Sized> AsRef<T> for SharedHandle<T> {
    fn as_ref(&self) -> &T {
        &**self
    }
}

impl<T: ?Sized> ReferenceCounted<T> for SharedHandle<T> {
    fn reference_count(this: &Self) -> usize {
        this.reference_count()
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(resource) => f.debug_tuple("SharedHandle").field(&resource).finish(),
            None => f.write_str("SharedHandle(null)"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resource {
            Some(resource) => fmt::Pointer::fmt(&resource, f),
            None => fmt::Pointer::fmt(&ptr::null::<()>(), f),
        }
    }
}

impl<T: ?Sized> Default for SharedHandle<T> {
    /// Creates an unbound handle.
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> From<Box<T>> for SharedHandle<T> {
    fn from(resource: Box<T>) -> Self {
        Self::new(Some(resource))
    }
}

impl<T> From<T> for SharedHandle<T> {
    fn from(value: T) -> Self {
        Self::from_value(value)
    }
}

impl<T: ?Sized + PartialEq> PartialEq for SharedHandle<T> {
    /// Equality for two handles.
    ///
    /// Two handles are equal if their resources are equal, even if they are stored in different
    /// allocations. Two unbound handles are equal.
    #[inline]
    fn eq(&self, other: &SharedHandle<T>) -> bool {
        self.get() == other.get()
    }
}

impl<T: ?Sized + Eq> Eq for SharedHandle<T> {}

impl<T: ?Sized + PartialOrd> PartialOrd for SharedHandle<T> {
    /// Compares the resources, with an unbound handle ordered before any bound one.
    fn partial_cmp(&self, other: &SharedHandle<T>) -> Option<Ordering> {
        self.get().partial_cmp(&other.get())
    }
}

impl<T: ?Sized + Ord> Ord for SharedHandle<T> {
    fn cmp(&self, other: &SharedHandle<T>) -> Ordering {
        self.get().cmp(&other.get())
    }
}

impl<T: ?Sized + Hash> Hash for SharedHandle<T> {
    /// Hashes the resource, so a bound handle hashes like the value it borrows as.
    ///
    /// An unbound handle feeds nothing to the hasher.
    fn hash<H: Hasher>(&self, state: &mut H) {
        if let Some(resource) = self.get() {
            resource.hash(state)
        }
    }
}

impl<T: ?Sized> Unpin for SharedHandle<T> {}
