//! Shared, lock-guarded resource with snapshot reads.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A thread-safe, reference-counted resource container with read-write locking.
///
/// `MtResource` provides synchronized access to a value of type `T` that is shared
/// between the render thread and the worker pools. It wraps an `Arc<RwLock<T>>`.
///
/// A panic on one worker while it holds a guard must not take the rest of the
/// pipeline down with it, so poisoned locks are recovered rather than propagated:
/// the data behind a voxel grid lock is always structurally valid, because every
/// mutation is a single cell write.
///
/// # Type Parameters
/// - `T`: The type of the contained resource, must be `Send + Sync`
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use voxel_streaming::core::MtResource;
///
/// let shared = MtResource::new(Arc::new(vec![1u8, 2, 3]));
///
/// // Readers take a cheap snapshot and drop the guard straight away.
/// let snapshot = shared.snapshot();
///
/// // Writers copy-on-write when a snapshot is still alive.
/// Arc::make_mut(&mut *shared.get_mut())[0] = 9;
///
/// assert_eq!(snapshot[0], 1);
/// assert_eq!(shared.get()[0], 9);
/// ```
pub struct MtResource<T: Send + Sync> {
    resource: Arc<RwLock<T>>,
}

impl<T: Send + Sync> MtResource<T> {
    /// Creates a new `MtResource` containing the given value.
    pub fn new(resource: T) -> Self {
        Self {
            resource: Arc::new(RwLock::new(resource)),
        }
    }

    /// Returns a read-only guard over the contained value.
    ///
    /// Hold the guard for as short a time as possible: writers on the render
    /// thread block until every reader has released it.
    pub fn get(&self) -> RwLockReadGuard<'_, T> {
        self.resource.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a mutable guard over the contained value.
    pub fn get_mut(&self) -> RwLockWriteGuard<'_, T> {
        self.resource.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the contained value, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.get_mut(), value)
    }
}

impl<T: Send + Sync + Clone> MtResource<T> {
    /// Clones the contained value out from under a short-lived read guard.
    ///
    /// With `T = Arc<_>` this is the snapshot primitive: the clone is a reference
    /// count bump and the caller keeps an immutable view of the data as it was.
    pub fn snapshot(&self) -> T {
        self.get().clone()
    }
}

impl<T: Send + Sync> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
