use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Option<Arc<AtomicBool>>> = const { RefCell::new(None) };
}

/// Returns true when the guard has given up on the facet call running on
/// this thread. Long running component code should poll this and return
/// early; it is always false outside of a guarded call.
pub fn interrupted() -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    })
}

/// Interrupt flag for one guarded call.
#[derive(Clone, Default)]
pub(crate) struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Make this the current thread's interrupt flag until the returned
    /// scope is dropped.
    pub fn install(&self) -> InterruptScope {
        let previous = CURRENT.with(|current| current.replace(Some(self.flag.clone())));
        InterruptScope { previous }
    }
}

pub(crate) struct InterruptScope {
    previous: Option<Arc<AtomicBool>>,
}

impl Drop for InterruptScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}
