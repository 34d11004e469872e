//! Platform-neutral mapped region over a fixed-size element array.

use std::io;
use std::marker::PhantomData;
use std::mem::size_of;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use log::debug;

use crate::errors::{RegionError, Result};
use crate::sys;

/// Upper bound on the bytes one region may map, element offset included.
///
/// Requests above this are rejected before any OS resource is touched,
/// so an oversized open cannot create or grow a file as a side effect.
pub const MAX_REGION_BYTES: u64 = 128 * 1024 * 1024;

bitflags! {
    /// How a region's backing file is opened and mapped.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionFlags: u32 {
        /// Fail instead of creating a missing backing file.
        const MUST_EXIST = 0x01;
        /// Map writable for this process; without it the region is
        /// read-only and `set`/`sync` report failure.
        const READ_WRITE = 0x02;
        /// Grant other processes access to the backing file.
        const SHARED = 0x04;
        /// Other processes may read but not write the backing file.
        const PROTECTED = 0x08;
    }
}

/// Marker for plain-data types that can live in a shared mapping.
///
/// # Safety
///
/// Implementors must be plain old data: every bit pattern must be a
/// valid value, with no pointers, padding invariants, or drop glue.
/// Peer processes read the raw bytes back with no validation, so the
/// type must also mean the same thing on both sides of the file.
pub unsafe trait Element: Copy + Send + Sync + 'static {}

// SAFETY: fixed-width numbers accept every bit pattern. Pointer-sized
// integers are deliberately not included; their width would have to
// match across every process sharing the file.
unsafe impl Element for u8 {}
unsafe impl Element for i8 {}
unsafe impl Element for u16 {}
unsafe impl Element for i16 {}
unsafe impl Element for u32 {}
unsafe impl Element for i32 {}
unsafe impl Element for u64 {}
unsafe impl Element for i64 {}
unsafe impl Element for f32 {}
unsafe impl Element for f64 {}

// SAFETY: arrays of plain data are plain data.
unsafe impl<T: Element, const N: usize> Element for [T; N] {}

/// Fixed-size element array mapped from a plain file and shared with
/// other processes.
///
/// This is the core type for shared-memory transport. It provides:
/// - One API over POSIX `mmap` and Windows file mappings
/// - A closed/open state machine with total accessors: [`get`],
///   [`set`], and [`sync`] never fail, they degrade to defaults on a
///   closed region or an out-of-range index
/// - OS error capture for the one fallible operation, [`open`]
///
/// # Examples
///
/// ```no_run
/// use mmap_ipc::{MappedRegion, RegionFlags};
///
/// let mut region = MappedRegion::<u8>::new();
/// region.open(
///     "signals.mmap",
///     RegionFlags::READ_WRITE | RegionFlags::SHARED,
///     16,
///     0,
/// )?;
/// region.set(0, b'7');
/// assert_eq!(region.get(0, b'0'), b'7');
/// region.sync();
/// region.close();
/// # Ok::<(), mmap_ipc::RegionError>(())
/// ```
///
/// A region owns its mapping exclusively: the type is deliberately not
/// `Clone`, and ownership moves with the value. Two processes share
/// data by each opening their own region over the same file.
///
/// [`get`]: MappedRegion::get
/// [`set`]: MappedRegion::set
/// [`sync`]: MappedRegion::sync
/// [`open`]: MappedRegion::open
pub struct MappedRegion<T: Element> {
    path: PathBuf,
    flags: RegionFlags,
    map: Option<sys::MapHandle>,
    // Published after `map` on open, cleared before it on close, so a
    // non-zero length always implies a live mapping.
    len: usize,
    offset: usize,
    last_error: Option<i32>,
    _elem: PhantomData<T>,
}

impl<T: Element> std::fmt::Debug for MappedRegion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("len", &self.len)
            .field("offset", &self.offset)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T: Element> Default for MappedRegion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> MappedRegion<T> {
    /// Create a region in the closed state. No file is touched until
    /// [`open`](MappedRegion::open).
    #[must_use]
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            flags: RegionFlags::empty(),
            map: None,
            len: 0,
            offset: 0,
            last_error: None,
            _elem: PhantomData,
        }
    }

    /// Map `element_count` elements of the file at `path`, starting
    /// `element_offset` elements into it.
    ///
    /// Any previous mapping on this region is closed first. With
    /// [`RegionFlags::READ_WRITE`] a missing file is created (unless
    /// [`RegionFlags::MUST_EXIST`]) and a short file is grown,
    /// zero-filled, to cover the mapped range; existing contents are
    /// never truncated. A read-only open of a missing or too-short file
    /// fails.
    ///
    /// On failure the region stays closed and
    /// [`last_error`](MappedRegion::last_error) records the OS code.
    ///
    /// # Errors
    ///
    /// Returns `RegionError::SizeLimit` if the mapping would exceed
    /// [`MAX_REGION_BYTES`], `RegionError::EmptyRegion` for a zero
    /// element count, and `RegionError::Open` when the OS rejects any
    /// step (open, size, or map).
    pub fn open<P: AsRef<Path>>(
        &mut self,
        path: P,
        flags: RegionFlags,
        element_count: usize,
        element_offset: usize,
    ) -> Result<()> {
        self.close();
        self.path = path.as_ref().to_path_buf();
        self.flags = flags;

        let elem_size = size_of::<T>() as u64;
        let total_bytes = (element_count as u64)
            .checked_add(element_offset as u64)
            .and_then(|n| n.checked_mul(elem_size));
        match total_bytes {
            Some(n) if n <= MAX_REGION_BYTES => {}
            _ => {
                self.last_error = Some(sys::SIZE_LIMIT_CODE);
                return Err(RegionError::SizeLimit {
                    requested: total_bytes.unwrap_or(u64::MAX),
                    limit: MAX_REGION_BYTES,
                });
            }
        }
        if element_count == 0 {
            self.last_error = Some(sys::SIZE_LIMIT_CODE);
            return Err(RegionError::EmptyRegion);
        }

        let len_bytes = (element_count as u64 * elem_size) as usize;
        let offset_bytes = element_offset as u64 * elem_size;

        match sys::MapHandle::open(&self.path, flags, len_bytes, offset_bytes) {
            Ok(map) => {
                self.map = Some(map);
                self.offset = element_offset;
                debug!(
                    "mapped '{}': {element_count} x {elem_size} B at element offset {element_offset}",
                    self.path.display()
                );
                // Published last, so the region is never observable in a
                // half-open state.
                self.len = element_count;
                Ok(())
            }
            Err(source) => {
                self.last_error = source.raw_os_error();
                Err(RegionError::Open {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }

    /// Unmap and release the backing file. Idempotent; a closed region
    /// keeps answering [`get`](MappedRegion::get) and friends with
    /// defaults. The backing file itself is left in place.
    pub fn close(&mut self) {
        // Mirror of open: length first, so the region reads as closed
        // throughout teardown.
        self.len = 0;
        self.last_error = None;
        if let Some(map) = self.map.take() {
            drop(map);
            debug!("unmapped '{}'", self.path.display());
        }
        self.offset = 0;
    }

    /// Read element `index`, or `default` when the region is closed or
    /// the index is out of range. Never fails.
    pub fn get(&self, index: usize, default: T) -> T {
        if index >= self.len {
            return default;
        }
        let Some(map) = self.map.as_ref() else {
            return default;
        };
        // SAFETY: `index < len` keeps the read inside the mapping, and
        // the pointer is T-aligned: the view base is page-aligned and
        // the element offset is a multiple of `size_of::<T>()`.
        unsafe { map.as_ptr().cast::<T>().add(index).read() }
    }

    /// Write `value` to element `index`. Returns `false`, writing
    /// nothing, when the region is closed, not mapped read-write, or
    /// the index is out of range. Never fails.
    pub fn set(&mut self, index: usize, value: T) -> bool {
        if index >= self.len || !self.flags.contains(RegionFlags::READ_WRITE) {
            return false;
        }
        let Some(map) = self.map.as_mut() else {
            return false;
        };
        // SAFETY: same bounds and alignment argument as `get`, and the
        // mapping is writable in READ_WRITE mode.
        unsafe { map.as_mut_ptr().cast::<T>().add(index).write(value) };
        true
    }

    /// Schedule dirty pages for write-back to the backing file.
    ///
    /// Best-effort on every platform: the call only initiates
    /// write-back and does not wait for the disk. Peers observing the
    /// mapping itself see writes without any sync. Returns `false` on a
    /// closed or read-only region, or when the OS rejects the request.
    pub fn sync(&self) -> bool {
        if self.len == 0 || !self.flags.contains(RegionFlags::READ_WRITE) {
            return false;
        }
        match &self.map {
            Some(map) => map.sync(),
            None => false,
        }
    }

    /// Whether the region currently holds no mapping.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.map.is_none()
    }

    /// Element count of the mapping; zero when closed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region maps no elements (always true when closed).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element offset of the current mapping; zero when closed,
    /// including after a failed open.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Flags passed to the most recent open call, successful or not.
    #[must_use]
    pub fn flags(&self) -> RegionFlags {
        self.flags
    }

    /// Backing file path of the most recent open call; empty before
    /// any.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// OS error code of the most recent failed open, if any. Cleared by
    /// the next open or close.
    #[must_use]
    pub fn last_error(&self) -> Option<i32> {
        self.last_error
    }

    /// Human-readable form of [`last_error`](MappedRegion::last_error).
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.last_error
            .map(|code| io::Error::from_raw_os_error(code).to_string())
    }
}

impl<T: Element> Drop for MappedRegion<T> {
    fn drop(&mut self) {
        self.close();
    }
}
