//! Process-wide accounting of bytes held by index storage

use std::sync::atomic::{AtomicUsize, Ordering};

static INDEX_BYTES: AtomicUsize = AtomicUsize::new(0);

/// Bytes currently charged by all live indexes.
pub fn allocated_bytes() -> usize {
    INDEX_BYTES.load(Ordering::Relaxed)
}

/// Kibibytes currently charged by all live indexes, as `vss_memory_usage()`
/// reports them.
pub fn allocated_kb() -> usize {
    allocated_bytes().div_ceil(1024)
}

/// The share of the global counter owned by one index. Released on drop.
#[derive(Debug, Default)]
pub struct MemoryCharge {
    bytes: usize,
}

impl MemoryCharge {
    /// Replace this charge with `bytes`.
    pub fn set(&mut self, bytes: usize) {
        if bytes >= self.bytes {
            INDEX_BYTES.fetch_add(bytes - self.bytes, Ordering::Relaxed);
        } else {
            INDEX_BYTES.fetch_sub(self.bytes - bytes, Ordering::Relaxed);
        }
        self.bytes = bytes;
        vss_core::observe::record_index_memory(allocated_bytes());
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for MemoryCharge {
    fn drop(&mut self) {
        self.set(0);
    }
}
