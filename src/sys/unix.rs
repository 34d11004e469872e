//! POSIX mapping backend.
//!
//! File setup goes through `std` (`OpenOptions` with flag-derived
//! permission bits); the mapping itself is raw `mmap`/`msync`/`munmap`.
//! Mapping offsets are aligned down to the page size with the remainder
//! kept as an internal delta, so callers may place elements at any byte
//! offset in the backing file.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::ptr;

use crate::region::RegionFlags;

/// A live POSIX mapping: the mapped view plus its open descriptor.
pub(crate) struct MapHandle {
    base: *mut libc::c_void,
    map_len: usize,
    delta: usize,
    // Held open until the view is unmapped; closes last.
    #[allow(dead_code)]
    file: File,
}

// SAFETY: the view is exclusively owned and valid until drop; moving the
// handle between threads does not move the mapping.
unsafe impl Send for MapHandle {}
// SAFETY: shared access only reads through `as_ptr`; writes require the
// exclusive `as_mut_ptr`.
unsafe impl Sync for MapHandle {}

impl MapHandle {
    /// Open (creating if allowed), size, and map `len_bytes` starting at
    /// `offset_bytes` of the file at `path`.
    pub(crate) fn open(
        path: &Path,
        flags: RegionFlags,
        len_bytes: usize,
        offset_bytes: u64,
    ) -> io::Result<Self> {
        let writable = flags.contains(RegionFlags::READ_WRITE);

        let mut opts = OpenOptions::new();
        opts.read(true)
            .mode(mode_bits(flags))
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK);
        if writable {
            opts.write(true)
                .create(!flags.contains(RegionFlags::MUST_EXIST));
        }
        let file = opts.open(path)?;

        // Grow (never shrink) the file to cover the mapped range.
        // ftruncate zero-fills, and it fails on a read-only descriptor,
        // which also rejects read-only opens of too-short files before
        // they could fault on access.
        let required = offset_bytes + len_bytes as u64;
        if file.metadata()?.len() < required {
            file.set_len(required)?;
        }

        let (aligned, delta) = split_offset(offset_bytes, page_size());
        let map_len = delta + len_bytes;
        let prot = if writable {
            libc::PROT_READ | libc::PROT_WRITE
        } else {
            libc::PROT_READ
        };

        // SAFETY: the descriptor is open, `map_len` is non-zero, and
        // `aligned` is a page multiple; MAP_FAILED is checked below.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                prot,
                libc::MAP_SHARED | populate_flag(),
                file.as_raw_fd(),
                aligned as libc::off_t,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            base,
            map_len,
            delta,
            file,
        })
    }

    /// First byte of the caller-visible range.
    pub(crate) fn as_ptr(&self) -> *const u8 {
        // SAFETY: `delta` is within the mapping by construction.
        unsafe { self.base.cast::<u8>().add(self.delta) }
    }

    /// Mutable address of the caller-visible range.
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        // SAFETY: `delta` is within the mapping by construction.
        unsafe { self.base.cast::<u8>().add(self.delta) }
    }

    /// Schedule dirty pages for write-back without waiting on the disk.
    pub(crate) fn sync(&self) -> bool {
        // SAFETY: `base`/`map_len` describe the live mapping.
        unsafe { libc::msync(self.base, self.map_len, libc::MS_ASYNC) == 0 }
    }
}

impl Drop for MapHandle {
    fn drop(&mut self) {
        // The view goes first; the descriptor closes when `file` drops.
        // SAFETY: `base`/`map_len` came from a successful mmap and are
        // released exactly once.
        unsafe {
            libc::munmap(self.base, self.map_len);
        }
    }
}

/// Permission bits for newly created files: owner read always, owner
/// write when mapping read-write, group/other read when shared,
/// group/other write unless the region is protected.
#[allow(clippy::unnecessary_cast)]
fn mode_bits(flags: RegionFlags) -> u32 {
    let mut mode = libc::S_IRUSR;
    if flags.contains(RegionFlags::READ_WRITE) {
        mode |= libc::S_IWUSR;
    }
    if flags.contains(RegionFlags::SHARED) {
        mode |= libc::S_IRGRP | libc::S_IROTH;
    }
    if !flags.contains(RegionFlags::PROTECTED) {
        mode |= libc::S_IWGRP | libc::S_IWOTH;
    }
    // mode_t is narrower than u32 on some platforms.
    mode as u32
}

/// Align `offset_bytes` down to `granularity`, returning the aligned
/// offset and the left-over delta.
fn split_offset(offset_bytes: u64, granularity: u64) -> (u64, usize) {
    let aligned = offset_bytes - (offset_bytes % granularity);
    (aligned, (offset_bytes - aligned) as usize)
}

#[allow(clippy::cast_sign_loss)]
fn page_size() -> u64 {
    // SAFETY: sysconf with _SC_PAGESIZE has no side effects.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE).max(1) as u64 }
}

#[cfg(target_os = "linux")]
const fn populate_flag() -> libc::c_int {
    // Pre-fault the mapping so polling loops do not stall on first touch.
    libc::MAP_POPULATE
}

#[cfg(not(target_os = "linux"))]
const fn populate_flag() -> libc::c_int {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_bits_follow_flags() {
        // Read-write and shared with everyone.
        let rw_shared = RegionFlags::READ_WRITE | RegionFlags::SHARED;
        assert_eq!(mode_bits(rw_shared), 0o666);

        // Protected drops group/other write.
        let protected = rw_shared | RegionFlags::PROTECTED;
        assert_eq!(mode_bits(protected), 0o644);

        // Private read-write keeps owner bits only for reading.
        let private = RegionFlags::READ_WRITE | RegionFlags::PROTECTED;
        assert_eq!(mode_bits(private), 0o600);
    }

    #[test]
    fn test_split_offset_alignment() {
        assert_eq!(split_offset(0, 4096), (0, 0));
        assert_eq!(split_offset(8, 4096), (0, 8));
        assert_eq!(split_offset(4096, 4096), (4096, 0));
        assert_eq!(split_offset(4100, 4096), (4096, 4));
    }

    #[test]
    fn test_page_size_is_sane() {
        let page = page_size();
        assert!(page >= 512);
        assert!(page.is_power_of_two());
    }
}
