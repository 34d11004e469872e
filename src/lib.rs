//! # mmap-ipc: shared-memory transport over memory-mapped files
//!
//! This crate maps fixed-size element arrays from plain files so two
//! processes can exchange signals by polling shared memory, with one
//! API over POSIX `mmap` and Windows file mappings.
//!
//! ## Features
//!
//! - **Total accessors**: `get`/`set`/`sync` never fail; a closed
//!   region or an out-of-range index degrades to defaults
//! - **Explicit lifecycle**: a region is a closed/open state machine
//!   that records the OS error of a failed open
//! - **Bounded**: mappings are capped at 128 MiB before any OS call
//! - **Cross-platform**: independent native backends, same behavior on
//!   Unix and Windows
//! - **Channel layer**: sixteen 4-bit signals per direction, stored as
//!   ASCII hex digits so the backing files stay editor-readable
//!
//! ## Quick Start
//!
//! ```no_run
//! use mmap_ipc::{MappedRegion, RegionFlags};
//!
//! // Map 16 bytes of a (created-on-demand) shared file.
//! let mut region = MappedRegion::<u8>::new();
//! region.open(
//!     "signals.mmap",
//!     RegionFlags::READ_WRITE | RegionFlags::SHARED,
//!     16,
//!     0,
//! )?;
//!
//! // Write and read elements; out-of-range access is harmless.
//! region.set(0, b'7');
//! assert_eq!(region.get(0, b'0'), b'7');
//! assert_eq!(region.get(999, b'0'), b'0');
//!
//! // Hint the OS to write dirty pages back, then unmap.
//! region.sync();
//! region.close();
//! # Ok::<(), mmap_ipc::RegionError>(())
//! ```
//!
//! ## Modules
//!
//! - [`errors`]: Error types for region acquisition
//! - [`region`]: Core [`MappedRegion`] implementation
//! - [`channel`]: 16-channel signal transport over two regions
//! - [`hex`]: ASCII hex digit codec for 4-bit signals
//! - [`clock`]: Explicit monotonic clock for polling loops

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(missing_docs)]
#![doc(html_root_url = "https://docs.rs/mmap-ipc")]

pub mod channel;
pub mod clock;
pub mod errors;
pub mod hex;
pub mod region;
mod sys;

pub use channel::{ChannelAdapter, CHANNEL_COUNT, MAX_SIGNAL};
pub use clock::TickClock;
pub use errors::RegionError;
pub use region::{Element, MappedRegion, RegionFlags, MAX_REGION_BYTES};
