use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    mem::MaybeUninit,
    sync::atomic::{AtomicU8, Ordering},
};

const UNINIT: u8 = 0;
const INITING: u8 = 1;
const READY: u8 = 2;
const FAILED: u8 = 3;

/// Observable lifecycle of an [`InitCell`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum InitState {
    Uninit,
    Initializing,
    Ready,
    /// The initializer ran and reported failure. Sticky.
    Failed,
}

/// Write-once slot for process-wide singletons.
///
/// The value is published with release ordering; readers that observe
/// [`InitState::Ready`] see a fully written `T`. A failed initializer moves
/// the cell to [`InitState::Failed`] for good, which callers surface as
/// "unavailable" instead of retrying from a context that cannot allocate.
pub struct InitCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Default for InitCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InitCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[must_use]
    pub fn state(&self) -> InitState {
        match self.state.load(Ordering::Acquire) {
            UNINIT => InitState::Uninit,
            INITING => InitState::Initializing,
            READY => InitState::Ready,
            _ => InitState::Failed,
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // SAFETY: READY is only stored after the value was written.
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Run `init` if nobody has yet; otherwise wait for the winner.
    ///
    /// Returns `None` when this or an earlier initializer failed.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Option<&T> {
        if self
            .state
            .compare_exchange(UNINIT, INITING, Ordering::Acquire, Ordering::Acquire)
            .is_ok()
        {
            return match init() {
                Ok(v) => Some(self.publish(v)),
                Err(_) => {
                    self.state.store(FAILED, Ordering::Release);
                    None
                }
            };
        }
        self.wait()
    }

    /// Install a ready-made value. Hands it back if the cell was not empty.
    pub fn set(&self, value: T) -> Result<&T, T> {
        if self
            .state
            .compare_exchange(UNINIT, INITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(value);
        }
        Ok(self.publish(value))
    }

    fn publish(&self, value: T) -> &T {
        // SAFETY: INITING is held exclusively by this caller.
        let r = unsafe { (*self.value.get()).write(value) };
        self.state.store(READY, Ordering::Release);
        r
    }

    fn wait(&self) -> Option<&T> {
        loop {
            match self.state.load(Ordering::Acquire) {
                INITING => spin_loop(),
                READY => {
                    // SAFETY: READY
                    return Some(unsafe { (*self.value.get()).assume_init_ref() });
                }
                _ => return None,
            }
        }
    }
}

impl<T> Drop for InitCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // SAFETY: READY means the slot holds an initialized value.
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}

// Safety: shared after READY; initialization is single-writer.
unsafe impl<T: Sync + Send> Sync for InitCell<T> {}
unsafe impl<T: Send> Send for InitCell<T> {}
