//! Keyboard configuration
//!
//! Matrix geometry, timing constants and the static key tables. The code
//! table maps flat scan points (`column * NROWS + row`) to HID key codes;
//! entries of `0x01` mark keys that report through the System Control
//! report instead of the regular key slots, resolved via [`SYSTEM_KEYS`].

use static_assertions::const_assert;

/// Number of strobed columns in the key matrix
pub const NCOLS: usize = 16;
/// Number of sensed rows in the key matrix
pub const NROWS: usize = 8;
/// Total number of scan points
pub const KEY_COUNT: usize = NCOLS * NROWS;

// Scan points must fit in a u8
const_assert!(NCOLS * NROWS <= 256);

/// Bitmask of active rows for one strobed column
pub type RowMask = u8;
/// Flat key identity: `column * NROWS + row`
pub type ScanPoint = u8;
/// HID key code table indexed by scan point
pub type Keymap = [u8; KEY_COUNT];

/// Number of raw samples per column used for debouncing. A row counts as
/// settled-active when at least 2 of the last [`DEBOUNCE_WINDOW`] samples
/// saw it active.
pub const DEBOUNCE_WINDOW: usize = 4;

/// Period of [`crate::keyboard::Keyboard::scan_tick`] calls
pub const SCAN_PERIOD_MS: u32 = 5;

/// Capacity of each report channel's ring buffer
pub const REPORT_QUEUE_SLOTS: usize = 8;

/// Number of scan cycles allowed to confirm a key-triggered wake before
/// it is declared spurious
pub const WAKE_CONFIRM_SCANS: u8 = 4;

/// How long to withhold reports after waking, masking the contact bounce
/// of whatever disturbance woke us
pub const WAKE_SUPPRESS_MS: u32 = 100;

/// Scan points that report through [`crate::keyboard::hid::ExtraKeysReport`]
/// rather than a key slot, with the report bit each one drives. Bit `n`
/// corresponds to Generic Desktop usage `0x81 + n` (System Control).
pub static SYSTEM_KEYS: &[(ScanPoint, u8)] = &[
    (0x11, 2), // System Wake Up (0x83)
    (0x2d, 4), // System Main Menu (0x85)
    (0x0d, 5), // System App Menu (0x86)
    (0x1b, 9), // System Menu Select (0x8a)
];
