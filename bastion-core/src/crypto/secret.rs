//! Scoped container for key material.

use zeroize::Zeroize;

/// A fixed-size byte buffer for secrets.
///
/// - Storage is zeroed on drop, on every exit path including unwind.
/// - On unix the backing allocation is `mlock`ed so the pages resist being
///   written to swap; lock failures (e.g. `RLIMIT_MEMLOCK`) are ignored
///   since zeroing still applies.
/// - Not `Clone`, so a secret cannot be silently duplicated. Ownership moves.
/// - `Debug` never prints the contents.
///
/// Zero-size construction is valid and performs no allocation.
pub struct SecretBuffer {
    data: Box<[u8]>,
}

impl SecretBuffer {
    /// Allocates a zero-filled buffer of `len` bytes.
    #[must_use]
    pub fn new(len: usize) -> Self {
        let data = vec![0u8; len].into_boxed_slice();
        lock_memory(&data);
        Self { data }
    }

    /// Builds a buffer from `bytes`, zeroing the source afterwards so the
    /// only live copy is the locked one.
    #[must_use]
    pub fn from_bytes(bytes: &mut [u8]) -> Self {
        let mut buf = Self::new(bytes.len());
        buf.data.copy_from_slice(bytes);
        bytes.zeroize();
        buf
    }

    /// Number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` when the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows the contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutably borrows the contents, e.g. as a KDF output target.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.data.zeroize();
        unlock_memory(&self.data);
    }
}

impl std::fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("len", &self.data.len())
            .field("data", &"[REDACTED]")
            .finish()
    }
}

#[cfg(unix)]
fn lock_memory(data: &[u8]) {
    if !data.is_empty() {
        // Best effort; EPERM/ENOMEM leave the buffer unlocked but functional.
        unsafe {
            let _ = libc::mlock(data.as_ptr().cast(), data.len());
        }
    }
}

#[cfg(unix)]
fn unlock_memory(data: &[u8]) {
    if !data.is_empty() {
        unsafe {
            let _ = libc::munlock(data.as_ptr().cast(), data.len());
        }
    }
}

#[cfg(not(unix))]
fn lock_memory(_data: &[u8]) {}

#[cfg(not(unix))]
fn unlock_memory(_data: &[u8]) {}
