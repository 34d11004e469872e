//! Signal channel transport over a pair of mapped regions.
//!
//! Two processes exchange sixteen 4-bit signals in each direction
//! through two small files in a shared directory: this side writes its
//! signals into `signals.i.mmap` and reads the peer's from
//! `signals.o.mmap` (the peer maps the same pair with the roles
//! swapped). Each file holds one ASCII hex digit per channel, stored in
//! reverse channel order so channel 15 is the first byte; a text editor
//! shows the same digit string a packed word prints as.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::errors::{RegionError, Result};
use crate::hex::{hex_to_nybble, nybble_to_hex};
use crate::region::{MappedRegion, RegionFlags};

/// Number of signal channels carried in each direction.
pub const CHANNEL_COUNT: usize = 16;

/// Strongest representable signal (4-bit range).
pub const MAX_SIGNAL: u8 = 0x0f;

const INPUT_FILE_NAME: &str = "signals.i.mmap";
const OUTPUT_FILE_NAME: &str = "signals.o.mmap";

/// Bidirectional 16-channel signal transport rooted in one directory.
///
/// [`open`](ChannelAdapter::open) pre-creates missing or short backing
/// files (all channels zero) before mapping, so either side may start
/// first. Closing an adapter that has been open unlinks both files
/// best-effort; dropping the adapter closes it.
pub struct ChannelAdapter {
    dir: PathBuf,
    input: MappedRegion<u8>,
    output: MappedRegion<u8>,
    ever_opened: bool,
}

impl ChannelAdapter {
    /// Adapter rooted at `dir`. Nothing is touched until
    /// [`open`](ChannelAdapter::open).
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            input: MappedRegion::new(),
            output: MappedRegion::new(),
            ever_opened: false,
        }
    }

    /// Adapter rooted in the system temp directory, the conventional
    /// rendezvous for co-located peers.
    #[must_use]
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Map both signal files, creating or re-zeroing any that is
    /// missing or shorter than [`CHANNEL_COUNT`] bytes. A full-size
    /// file keeps its contents, so a peer that started first is not
    /// disturbed.
    ///
    /// The input side is mapped read-write and shared; the output side
    /// is mapped read-only, since only the peer writes it.
    ///
    /// # Errors
    ///
    /// Returns `RegionError::Open` when either file cannot be prepared
    /// or mapped. Neither region stays open on failure.
    pub fn open(&mut self) -> Result<()> {
        // Unmap only; unlinking is a close-side decision and would
        // destroy a live peer file here.
        self.input.close();
        self.output.close();
        let input_path = self.input_path();
        let output_path = self.output_path();
        ensure_backing_file(&input_path)?;
        ensure_backing_file(&output_path)?;

        self.input.open(
            &input_path,
            RegionFlags::READ_WRITE | RegionFlags::SHARED,
            CHANNEL_COUNT,
            0,
        )?;
        if let Err(err) = self
            .output
            .open(&output_path, RegionFlags::SHARED, CHANNEL_COUNT, 0)
        {
            self.input.close();
            return Err(err);
        }
        debug!("signal transport open in '{}'", self.dir.display());
        self.ever_opened = true;
        Ok(())
    }

    /// Unmap both regions and unlink the backing files. Files are
    /// removed only when this adapter has mapped them at least once; a
    /// never-opened adapter leaves another process's pair alone.
    /// Removal is best-effort: a peer that is still mapped keeps its
    /// view, and a file that is already gone is not an error.
    /// Idempotent.
    pub fn close(&mut self) {
        self.input.close();
        self.output.close();
        if !self.ever_opened {
            return;
        }
        self.ever_opened = false;
        for path in [self.input_path(), self.output_path()] {
            if let Err(err) = fs::remove_file(&path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug!("leaving '{}' behind: {err}", path.display());
                }
            }
        }
    }

    /// Whether both directions are currently mapped.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.input.is_closed() && !self.output.is_closed()
    }

    /// Signal this side last wrote to `channel`; 0 when closed or out
    /// of range.
    #[must_use]
    pub fn input(&self, channel: usize) -> u8 {
        if channel >= CHANNEL_COUNT {
            return 0;
        }
        hex_to_nybble(self.input.get(slot(channel), 0))
    }

    /// Write `signal` (clamped to [`MAX_SIGNAL`]) to `channel`. Does
    /// nothing when the transport is closed or the channel is out of
    /// range.
    pub fn set_input(&mut self, channel: usize, signal: u8) {
        if channel >= CHANNEL_COUNT {
            return;
        }
        self.input
            .set(slot(channel), nybble_to_hex(signal.min(MAX_SIGNAL)));
    }

    /// Signal the peer last wrote to `channel`; 0 when closed or out of
    /// range.
    #[must_use]
    pub fn output(&self, channel: usize) -> u8 {
        if channel >= CHANNEL_COUNT {
            return 0;
        }
        hex_to_nybble(self.output.get(slot(channel), 0))
    }

    /// All input signals packed into one word, channel 0 in the least
    /// significant nybble.
    #[must_use]
    pub fn inputs(&self) -> u64 {
        let mut word = 0;
        for channel in (0..CHANNEL_COUNT).rev() {
            word = (word << 4) | u64::from(self.input(channel));
        }
        word
    }

    /// All peer signals packed into one word, channel 0 in the least
    /// significant nybble.
    #[must_use]
    pub fn outputs(&self) -> u64 {
        let mut word = 0;
        for channel in (0..CHANNEL_COUNT).rev() {
            word = (word << 4) | u64::from(self.output(channel));
        }
        word
    }

    /// Write every input channel from `word`, channel 0 taken from the
    /// least significant nybble.
    pub fn set_inputs(&mut self, word: u64) {
        self.set_inputs_masked(word, 0);
    }

    /// Like [`set_inputs`](ChannelAdapter::set_inputs), but nybbles
    /// selected by `keep_mask` retain their current input value instead
    /// of taking the one from `word`.
    pub fn set_inputs_masked(&mut self, word: u64, keep_mask: u64) {
        let mut merged = (word & !keep_mask) | (self.inputs() & keep_mask);
        for channel in 0..CHANNEL_COUNT {
            self.set_input(channel, (merged & 0x0f) as u8);
            merged >>= 4;
        }
    }

    /// Directory the signal files live in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file this side writes.
    #[must_use]
    pub fn input_path(&self) -> PathBuf {
        self.dir.join(INPUT_FILE_NAME)
    }

    /// Path of the file the peer writes.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.dir.join(OUTPUT_FILE_NAME)
    }
}

impl Default for ChannelAdapter {
    fn default() -> Self {
        Self::in_temp_dir()
    }
}

impl Drop for ChannelAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChannelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelAdapter")
            .field("dir", &self.dir)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Byte position of `channel` in a signal file (reverse order; channel
/// 15 is byte 0).
fn slot(channel: usize) -> usize {
    CHANNEL_COUNT - 1 - channel
}

/// Create or re-zero `path` so it holds one `'0'` digit per channel.
/// Healthy files are left alone; a mapped peer never sees a truncation.
fn ensure_backing_file(path: &Path) -> Result<()> {
    let needs_init = match fs::metadata(path) {
        Ok(meta) => meta.len() < CHANNEL_COUNT as u64,
        Err(_) => true,
    };
    if needs_init {
        fs::write(path, [b'0'; CHANNEL_COUNT]).map_err(|source| RegionError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
