//! Id generator that can be switched off.

use std::sync::atomic::{AtomicBool, Ordering};

use pushgate_core::{IdGen, IdGenError, SequenceIdGen};

/// [`SequenceIdGen`] that fails with `Unavailable` while disabled.
#[derive(Debug, Default)]
pub struct FailingIdGen {
    inner: SequenceIdGen,
    down: AtomicBool,
}

impl FailingIdGen {
    /// Working generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle failure.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

impl IdGen for FailingIdGen {
    fn next_id(&self, namespace: &str) -> Result<i64, IdGenError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(IdGenError::Unavailable("injected failure".to_owned()));
        }
        self.inner.next_id(namespace)
    }
}
