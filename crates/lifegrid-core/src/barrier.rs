use parking_lot::{Condvar, Mutex};

/// One-shot start signal shared by the founders.
///
/// Founders park in [`StartBarrier::wait`] until the coordinator calls
/// [`StartBarrier::release`], so every founder begins its first iteration
/// after the same instant regardless of how long thread creation took.
/// Unlike a counting barrier, a founder that never started cannot keep the
/// others parked.
#[derive(Debug, Default)]
pub struct StartBarrier {
    released: Mutex<bool>,
    signal: Condvar,
}

impl StartBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(&self) {
        let mut released = self.released.lock();
        while !*released {
            self.signal.wait(&mut released);
        }
    }

    pub fn release(&self) {
        *self.released.lock() = true;
        self.signal.notify_all();
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock()
    }
}
