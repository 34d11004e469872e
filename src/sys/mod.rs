//! Platform mapping backends.
//!
//! Exactly one backend compiles per target. Both expose the same
//! surface (`MapHandle::open`, pointer access, `sync`, teardown on
//! drop) and keep their platform details to themselves; everything
//! above this module is platform-neutral.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub(crate) use unix::MapHandle;

        /// Error code recorded for oversized or empty mapping requests.
        pub(crate) const SIZE_LIMIT_CODE: i32 = libc::ERANGE;
    } else if #[cfg(windows)] {
        mod windows;
        pub(crate) use windows::MapHandle;

        /// `ERROR_NOT_ENOUGH_MEMORY`.
        pub(crate) const SIZE_LIMIT_CODE: i32 = 8;
    } else {
        compile_error!("mmap-ipc requires a Unix or Windows target");
    }
}
