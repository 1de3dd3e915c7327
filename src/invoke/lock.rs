use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// How a facet call synchronizes with other calls on the same resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    /// No synchronization.
    None,
    /// Shared with other `Read` calls, excluded by `Write` calls.
    Read,
    /// Excludes every other locked call.
    Write,
}

/// Per-resource lock guarding facet calls.
#[derive(Debug, Default)]
pub struct FacetLock {
    inner: RwLock<()>,
}

pub enum FacetLockGuard<'a> {
    None,
    Read(#[allow(dead_code)] RwLockReadGuard<'a, ()>),
    Write(#[allow(dead_code)] RwLockWriteGuard<'a, ()>),
}

impl FacetLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is held with the requested discipline.
    pub fn acquire(&self, lock: LockType) -> FacetLockGuard<'_> {
        match lock {
            LockType::None => FacetLockGuard::None,
            LockType::Read => FacetLockGuard::Read(self.inner.read()),
            LockType::Write => FacetLockGuard::Write(self.inner.write()),
        }
    }

    /// Returns true if an exclusive holder currently owns the lock.
    pub fn is_write_locked(&self) -> bool {
        self.inner.is_locked_exclusive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_guards_share() {
        let lock = FacetLock::new();
        let _a = lock.acquire(LockType::Read);
        let _b = lock.acquire(LockType::Read);
        assert!(!lock.is_write_locked());
    }

    #[test]
    fn write_guard_is_exclusive() {
        let lock = FacetLock::new();
        {
            let _w = lock.acquire(LockType::Write);
            assert!(lock.is_write_locked());
            assert!(lock.inner.try_read().is_none());
        }
        assert!(lock.inner.try_write().is_some());
    }

    #[test]
    fn none_does_not_lock() {
        let lock = FacetLock::new();
        let _w = lock.acquire(LockType::Write);
        let _n = lock.acquire(LockType::None);
    }
}
