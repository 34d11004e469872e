//! Windows mapping backend.
//!
//! Win32 calls are declared inline; no bindings crate is pulled in for
//! the handful of functions this backend needs. View offsets are
//! aligned down to the allocation granularity (64 KiB on desktop
//! Windows) with the remainder kept as an internal delta. Teardown is
//! drop-ordered: view, then mapping object, then file handle.

use std::ffi::c_void;
use std::io;
use std::mem::{size_of, MaybeUninit};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};
use std::path::Path;
use std::ptr;

use crate::region::RegionFlags;

type HANDLE = *mut c_void;

const INVALID_HANDLE_VALUE: HANDLE = -1isize as HANDLE;
const GENERIC_READ: u32 = 0x8000_0000;
const GENERIC_WRITE: u32 = 0x4000_0000;
const FILE_SHARE_READ: u32 = 0x0000_0001;
const FILE_SHARE_WRITE: u32 = 0x0000_0002;
const OPEN_EXISTING: u32 = 3;
const OPEN_ALWAYS: u32 = 4;
const FILE_ATTRIBUTE_NORMAL: u32 = 0x80;
const FILE_END: u32 = 2;
const PAGE_READONLY: u32 = 0x02;
const PAGE_READWRITE: u32 = 0x04;
const FILE_MAP_READ: u32 = 0x0004;
const FILE_MAP_ALL_ACCESS: u32 = 0x000f_001f;
const SECURITY_DESCRIPTOR_REVISION: u32 = 1;
const ERROR_INVALID_PARAMETER: i32 = 87;

#[allow(non_snake_case)]
#[repr(C)]
struct SECURITY_ATTRIBUTES {
    nLength: u32,
    lpSecurityDescriptor: *mut c_void,
    bInheritHandle: i32,
}

#[allow(non_snake_case)]
#[repr(C)]
struct SECURITY_DESCRIPTOR {
    Revision: u8,
    Sbz1: u8,
    Control: u16,
    Owner: *mut c_void,
    Group: *mut c_void,
    Sacl: *mut c_void,
    Dacl: *mut c_void,
}

#[allow(non_snake_case)]
#[repr(C)]
struct SYSTEM_INFO {
    wProcessorArchitecture: u16,
    wReserved: u16,
    dwPageSize: u32,
    lpMinimumApplicationAddress: *mut c_void,
    lpMaximumApplicationAddress: *mut c_void,
    dwActiveProcessorMask: usize,
    dwNumberOfProcessors: u32,
    dwProcessorType: u32,
    dwAllocationGranularity: u32,
    wProcessorLevel: u16,
    wProcessorRevision: u16,
}

extern "system" {
    fn CreateFileW(
        lpFileName: *const u16,
        dwDesiredAccess: u32,
        dwShareMode: u32,
        lpSecurityAttributes: *mut SECURITY_ATTRIBUTES,
        dwCreationDisposition: u32,
        dwFlagsAndAttributes: u32,
        hTemplateFile: HANDLE,
    ) -> HANDLE;
    fn GetFileSizeEx(hFile: HANDLE, lpFileSize: *mut i64) -> i32;
    fn SetFilePointerEx(
        hFile: HANDLE,
        liDistanceToMove: i64,
        lpNewFilePointer: *mut i64,
        dwMoveMethod: u32,
    ) -> i32;
    fn WriteFile(
        hFile: HANDLE,
        lpBuffer: *const c_void,
        nNumberOfBytesToWrite: u32,
        lpNumberOfBytesWritten: *mut u32,
        lpOverlapped: *mut c_void,
    ) -> i32;
    fn CreateFileMappingW(
        hFile: HANDLE,
        lpFileMappingAttributes: *mut SECURITY_ATTRIBUTES,
        flProtect: u32,
        dwMaximumSizeHigh: u32,
        dwMaximumSizeLow: u32,
        lpName: *const u16,
    ) -> HANDLE;
    fn MapViewOfFile(
        hFileMappingObject: HANDLE,
        dwDesiredAccess: u32,
        dwFileOffsetHigh: u32,
        dwFileOffsetLow: u32,
        dwNumberOfBytesToMap: usize,
    ) -> *mut c_void;
    fn FlushViewOfFile(lpBaseAddress: *const c_void, dwNumberOfBytesToFlush: usize) -> i32;
    fn UnmapViewOfFile(lpBaseAddress: *const c_void) -> i32;
    fn GetSystemInfo(lpSystemInfo: *mut SYSTEM_INFO);
}

#[link(name = "advapi32")]
extern "system" {
    fn InitializeSecurityDescriptor(
        pSecurityDescriptor: *mut SECURITY_DESCRIPTOR,
        dwRevision: u32,
    ) -> i32;
    fn SetSecurityDescriptorDacl(
        pSecurityDescriptor: *mut SECURITY_DESCRIPTOR,
        bDaclPresent: i32,
        pDacl: *mut c_void,
        bDaclDefaulted: i32,
    ) -> i32;
}

/// The mapped view; unmapped on drop, before any handle closes.
struct View {
    base: *mut c_void,
    len: usize,
    delta: usize,
}

impl Drop for View {
    fn drop(&mut self) {
        // SAFETY: `base` came from a successful MapViewOfFile and is
        // released exactly once.
        unsafe {
            UnmapViewOfFile(self.base);
        }
    }
}

/// A live Windows mapping: view, mapping object, file handle.
///
/// Field order is teardown order.
pub(crate) struct MapHandle {
    view: View,
    // Held open until the view is unmapped; drop runs in field order.
    #[allow(dead_code)]
    mapping: OwnedHandle,
    #[allow(dead_code)]
    file: OwnedHandle,
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
        let wide = wide_path(path);

        let mut access = GENERIC_READ;
        if writable {
            access |= GENERIC_WRITE;
        }
        // Peers must be able to open and map the same file concurrently.
        let share = FILE_SHARE_READ | FILE_SHARE_WRITE;
        let disposition = if writable && !flags.contains(RegionFlags::MUST_EXIST) {
            OPEN_ALWAYS
        } else {
            OPEN_EXISTING
        };

        // A shared region carries an empty DACL so any peer may open it.
        // SAFETY: SECURITY_DESCRIPTOR is plain data; all-zero is a valid
        // pre-initialization state.
        let mut descriptor = unsafe { MaybeUninit::<SECURITY_DESCRIPTOR>::zeroed().assume_init() };
        let mut security = SECURITY_ATTRIBUTES {
            nLength: size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: ptr::null_mut(),
            bInheritHandle: 1,
        };
        let security_ptr: *mut SECURITY_ATTRIBUTES = if flags.contains(RegionFlags::SHARED) {
            // SAFETY: `descriptor` outlives every call below; the kernel
            // copies what it needs at creation time.
            unsafe {
                InitializeSecurityDescriptor(&mut descriptor, SECURITY_DESCRIPTOR_REVISION);
                SetSecurityDescriptorDacl(&mut descriptor, 1, ptr::null_mut(), 0);
            }
            security.lpSecurityDescriptor = ptr::addr_of_mut!(descriptor).cast();
            &mut security
        } else {
            ptr::null_mut()
        };

        // SAFETY: `wide` is NUL-terminated; failure is checked against
        // INVALID_HANDLE_VALUE.
        let raw = unsafe {
            CreateFileW(
                wide.as_ptr(),
                access,
                share,
                security_ptr,
                disposition,
                FILE_ATTRIBUTE_NORMAL,
                ptr::null_mut(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: the handle is valid and exclusively ours; OwnedHandle
        // closes it on every early return below.
        let file = unsafe { OwnedHandle::from_raw_handle(raw) };

        let required = offset_bytes + len_bytes as u64;
        let mut size: i64 = 0;
        // SAFETY: the handle is open and `size` is a valid out pointer.
        if unsafe { GetFileSizeEx(file.as_raw_handle(), &mut size) } == 0 {
            return Err(io::Error::last_os_error());
        }
        let current = u64::try_from(size).unwrap_or(0);
        if current < required {
            if !writable {
                // Cannot grow the file through a read-only handle.
                return Err(io::Error::from_raw_os_error(ERROR_INVALID_PARAMETER));
            }
            zero_pad(file.as_raw_handle(), required - current)?;
        }

        let protect = if writable { PAGE_READWRITE } else { PAGE_READONLY };
        // Maximum size zero maps the whole file, which now covers the
        // requested range. The mapping object stays unnamed; peers
        // rendezvous on the file path.
        // SAFETY: failure is checked against null.
        let raw = unsafe {
            CreateFileMappingW(
                file.as_raw_handle(),
                security_ptr,
                protect,
                0,
                0,
                ptr::null(),
            )
        };
        if raw.is_null() {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: the handle is valid and exclusively ours.
        let mapping = unsafe { OwnedHandle::from_raw_handle(raw) };

        let (aligned, delta) = split_offset(offset_bytes, allocation_granularity());
        let view_len = delta + len_bytes;
        let view_access = if writable {
            FILE_MAP_ALL_ACCESS
        } else {
            FILE_MAP_READ
        };

        // SAFETY: `aligned` is a granularity multiple and the mapping
        // covers `aligned + view_len`; failure is checked against null.
        let base = unsafe {
            MapViewOfFile(
                mapping.as_raw_handle(),
                view_access,
                (aligned >> 32) as u32,
                (aligned & 0xffff_ffff) as u32,
                view_len,
            )
        };
        if base.is_null() {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            view: View {
                base,
                len: view_len,
                delta,
            },
            mapping,
            file,
        })
    }

    /// First byte of the caller-visible range.
    pub(crate) fn as_ptr(&self) -> *const u8 {
        // SAFETY: `delta` is within the view by construction.
        unsafe { self.view.base.cast::<u8>().add(self.view.delta) }
    }

    /// Mutable address of the caller-visible range.
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        // SAFETY: `delta` is within the view by construction.
        unsafe { self.view.base.cast::<u8>().add(self.view.delta) }
    }

    /// Kick off write-back of the view without waiting on the disk.
    pub(crate) fn sync(&self) -> bool {
        // SAFETY: the view is live for `len` bytes.
        unsafe { FlushViewOfFile(self.view.base, self.view.len) != 0 }
    }
}

/// Append `count` zero bytes at end-of-file through `handle`.
fn zero_pad(handle: HANDLE, count: u64) -> io::Result<()> {
    // SAFETY: the handle is open for writing.
    if unsafe { SetFilePointerEx(handle, 0, ptr::null_mut(), FILE_END) } == 0 {
        return Err(io::Error::last_os_error());
    }
    let zeros = [0u8; 4096];
    let mut left = count;
    while left > 0 {
        let chunk = left.min(zeros.len() as u64) as u32;
        let mut written: u32 = 0;
        // SAFETY: `zeros` outlives the call and `chunk` is within it.
        let ok = unsafe {
            WriteFile(
                handle,
                zeros.as_ptr().cast(),
                chunk,
                &mut written,
                ptr::null_mut(),
            )
        };
        if ok == 0 || written == 0 {
            return Err(io::Error::last_os_error());
        }
        left -= u64::from(written);
    }
    Ok(())
}

fn wide_path(path: &Path) -> Vec<u16> {
    path.as_os_str().encode_wide().chain(Some(0)).collect()
}

/// Align `offset_bytes` down to `granularity`, returning the aligned
/// offset and the left-over delta.
fn split_offset(offset_bytes: u64, granularity: u64) -> (u64, usize) {
    let aligned = offset_bytes - (offset_bytes % granularity);
    (aligned, (offset_bytes - aligned) as usize)
}

/// View offsets must align to the allocation granularity, not the page
/// size.
fn allocation_granularity() -> u64 {
    let mut sysinfo = MaybeUninit::<SYSTEM_INFO>::uninit();
    // SAFETY: GetSystemInfo fills the buffer and cannot fail.
    unsafe {
        GetSystemInfo(sysinfo.as_mut_ptr());
        u64::from(sysinfo.assume_init().dwAllocationGranularity)
    }
}
