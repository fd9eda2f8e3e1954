// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connector backed by an anonymous shared mapping.
//!
//! The mapping is created with `MAP_SHARED | MAP_ANONYMOUS` before the
//! application forks, so parent and children keep addressing the same pages:
//! a payload written by the parent after the fork is visible to every child.
//! Unrelated processes cannot attach to it; use a
//! [`FileConnector`](crate::FileConnector) for those.
//!
//! Layout of the mapping:
//!
//! ```text
//! | lock: u64 | sequence: u64 | length: u64 | JSON document ... |
//! ```
//!
//! Writers serialise on the lock word. Readers never take it: the sequence is
//! odd while a write is in progress, and a read is retried when the sequence
//! moved while the document was being copied.

use std::fmt;
use std::io;
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::thread;

use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::metadata::{ConfigMetadata, RawConfig, SharedData, SharedDataRef};

/// Payload capacity used by [`SharedMemoryConnector::new`].
pub const DEFAULT_SHARED_MEMORY_CAPACITY: usize = 1 << 20;

const LOCK_OFFSET: usize = 0;
const SEQUENCE_OFFSET: usize = 8;
const LENGTH_OFFSET: usize = 16;
const HEADER_LEN: usize = 24;

/// Reads give up after this many attempts to find a quiescent slot. A writer
/// that died mid-write leaves the sequence odd forever.
const MAX_READ_ATTEMPTS: usize = 10_000;

/// Fork-shared single-slot connector.
pub struct SharedMemoryConnector {
    base: NonNull<u8>,
    mapped_len: usize,
}

// SAFETY: the header is only touched through atomics and the document area
// only through seqlock-guarded copies, so the mapping can be shared freely.
unsafe impl Send for SharedMemoryConnector {}
unsafe impl Sync for SharedMemoryConnector {}

impl SharedMemoryConnector {
    pub fn new() -> Result<Self, ConnectorError> {
        Self::with_capacity(DEFAULT_SHARED_MEMORY_CAPACITY)
    }

    /// Maps a segment able to hold a serialized payload of `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Result<Self, ConnectorError> {
        let mapped_len = capacity.checked_add(HEADER_LEN).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "shared memory capacity overflow")
        })?;
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapped_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error().into());
        }
        let base = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping"))?;
        // Anonymous mappings are zero-filled: unlocked, sequence 0, empty.
        Ok(Self { base, mapped_len })
    }

    /// Largest serialized payload the segment accepts.
    pub fn capacity(&self) -> usize {
        self.mapped_len - HEADER_LEN
    }

    fn word(&self, offset: usize) -> &AtomicU64 {
        // SAFETY: `offset` is one of the header offsets, 8-byte aligned from a
        // page-aligned base, and the mapping lives as long as `self`.
        unsafe { &*self.base.as_ptr().add(offset).cast::<AtomicU64>() }
    }

    fn document(&self) -> *mut u8 {
        // SAFETY: HEADER_LEN is within the mapping.
        unsafe { self.base.as_ptr().add(HEADER_LEN) }
    }

    fn lock(&self) -> WriteGuard<'_> {
        let lock = self.word(LOCK_OFFSET);
        while lock
            .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            thread::yield_now();
        }
        WriteGuard { lock }
    }
}

struct WriteGuard<'a> {
    lock: &'a AtomicU64,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.store(0, Ordering::Release);
    }
}

impl Connector for SharedMemoryConnector {
    fn write(
        &self,
        metadata: Option<&ConfigMetadata>,
        config: &RawConfig,
    ) -> Result<(), ConnectorError> {
        let document = serde_json::to_vec(&SharedDataRef { metadata, config })?;
        if document.len() > self.capacity() {
            return Err(ConnectorError::PayloadTooLarge {
                size: document.len(),
                capacity: self.capacity(),
            });
        }

        let _guard = self.lock();
        let sequence = self.word(SEQUENCE_OFFSET);
        let start = sequence.load(Ordering::Relaxed);
        sequence.store(start.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        // SAFETY: the length was checked against the capacity above and the
        // writer lock is held.
        unsafe { ptr::copy_nonoverlapping(document.as_ptr(), self.document(), document.len()) };
        self.word(LENGTH_OFFSET)
            .store(document.len() as u64, Ordering::Relaxed);
        sequence.store(start.wrapping_add(2), Ordering::Release);
        Ok(())
    }

    fn read(&self) -> Result<Option<SharedData>, ConnectorError> {
        let sequence = self.word(SEQUENCE_OFFSET);
        for _ in 0..MAX_READ_ATTEMPTS {
            let before = sequence.load(Ordering::Acquire);
            if before == 0 {
                return Ok(None);
            }
            if before % 2 == 1 {
                thread::yield_now();
                continue;
            }
            let length = usize::try_from(self.word(LENGTH_OFFSET).load(Ordering::Relaxed))
                .unwrap_or(usize::MAX)
                .min(self.capacity());
            let mut bytes = vec![0u8; length];
            // SAFETY: `length` is clamped to the document area; a concurrent
            // write is detected through the sequence check below.
            unsafe { ptr::copy_nonoverlapping(self.document(), bytes.as_mut_ptr(), length) };
            fence(Ordering::Acquire);
            if sequence.load(Ordering::Relaxed) != before {
                continue;
            }
            return Ok(Some(serde_json::from_slice(&bytes)?));
        }
        Err(io::Error::new(io::ErrorKind::WouldBlock, "shared memory slot stayed busy").into())
    }
}

impl Drop for SharedMemoryConnector {
    fn drop(&mut self) {
        // SAFETY: `base` and `mapped_len` describe the mapping created in
        // `with_capacity`, unmapped exactly once here.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.mapped_len);
        }
    }
}

impl fmt::Debug for SharedMemoryConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemoryConnector")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
