//! Local store that refuses to work

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use wizsync_draft::{LocalStore, MemoryStore, StorageError};

/// Wraps a [`MemoryStore`]; writes (and optionally reads) fail while armed
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    attempts: AtomicU32,
}

impl FailingStore {
    /// Writes fail, reads succeed (quota exceeded)
    pub fn writes() -> Self {
        let store = Self::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    /// Everything fails (storage disabled)
    pub fn all() -> Self {
        let store = Self::writes();
        store.fail_reads.store(true, Ordering::SeqCst);
        store
    }

    pub fn set_failing(&self, writes: bool, reads: bool) {
        self.fail_writes.store(writes, Ordering::SeqCst);
        self.fail_reads.store(reads, Ordering::SeqCst);
    }

    /// Write attempts seen, failed or not
    pub fn write_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> Result<(), StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("storage disabled".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("quota exceeded".into()));
        }
        Ok(())
    }
}

impl LocalStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_read()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.remove(key)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.check_read()?;
        self.inner.keys(prefix)
    }
}
