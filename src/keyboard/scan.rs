//! Translation of settled scan points into HID reports
//!
//! Driven through an explicit protocol once per scan cycle: [`begin`],
//! one [`add_point`] per settled key in increasing scan-point order, an
//! optional [`invalidate`] when the cycle is electrically ambiguous, and
//! [`end`], which runs the wake-confirmation step and hands the finished
//! reports to the per-channel queues.
//!
//! [`begin`]: ScanProcessor::begin
//! [`add_point`]: ScanProcessor::add_point
//! [`invalidate`]: ScanProcessor::invalidate
//! [`end`]: ScanProcessor::end

use crate::config::{Keymap, REPORT_QUEUE_SLOTS, SYSTEM_KEYS, ScanPoint};
use super::hid::{ExtraKeysReport, KeyboardReport, ReportQueue};
use super::power::{Fsm, HostBus, WakeFlags};

/// Keymap entry for an unconnected scan point
const CODE_NONE: u8 = 0x00;
/// Keymap entry marking a key that reports through [`ExtraKeysReport`]
const CODE_SYSTEM: u8 = 0x01;
/// HID ErrorRollOver, written to every key slot of an invalid cycle so
/// the host drops the ambiguous input instead of guessing
const CODE_ROLLOVER_ERROR: u8 = 0x01;
/// Modifier codes map 1:1 onto bits 0..8 of the modifier byte
const MODIFIER_FIRST: u8 = 0xe0;
const MODIFIER_LAST: u8 = 0xe7;

/// Per-cycle translator from scan points to report mutations
pub struct ScanProcessor {
    keymap: &'static Keymap,
    keyboard: KeyboardReport,
    extra: ExtraKeysReport,
    keyboard_queue: ReportQueue<KeyboardReport, REPORT_QUEUE_SLOTS>,
    extra_queue: ReportQueue<ExtraKeysReport, REPORT_QUEUE_SLOTS>,
    slots_used: u8,
    rollover: bool,
    live_key: bool,
}

impl ScanProcessor {
    pub fn new(keymap: &'static Keymap) -> Self {
        Self {
            keymap,
            keyboard: KeyboardReport::default(),
            extra: ExtraKeysReport::default(),
            keyboard_queue: ReportQueue::new(),
            extra_queue: ReportQueue::new(),
            slots_used: 0,
            rollover: false,
            live_key: false,
        }
    }

    /// Start a new scan cycle with empty in-progress reports
    pub fn begin(&mut self) {
        self.keyboard = KeyboardReport::default();
        self.extra = ExtraKeysReport::default();
        self.slots_used = 0;
        self.rollover = false;
        self.live_key = false;
    }

    /// Record one settled key for this cycle
    pub fn add_point(&mut self, point: ScanPoint) {
        let code = self.keymap[point as usize];
        if code == CODE_NONE {
            return;
        }
        self.live_key = true;

        if code == CODE_SYSTEM {
            match SYSTEM_KEYS.iter().find(|(p, _)| *p == point) {
                Some(&(_, bit)) => self.extra.set_usage_bit(bit),
                None => warn!("unmapped system scan point {}", point),
            }
        } else if (MODIFIER_FIRST..=MODIFIER_LAST).contains(&code) {
            self.keyboard.modifier |= 1 << (code & 0x0f);
        } else if (self.slots_used as usize) < self.keyboard.keycodes.len() {
            self.keyboard.keycodes[self.slots_used as usize] = code;
            self.slots_used += 1;
        } else {
            // 7th simultaneous key; end() turns this into ErrorRollOver
            self.rollover = true;
        }
    }

    /// Mark the whole cycle invalid (ghosted keys)
    pub fn invalidate(&mut self) {
        self.rollover = true;
    }

    /// Finish the cycle: resolve rollover, run the wake-confirmation step
    /// and enqueue both channels. Enqueueing is unconditional; the queues
    /// decide whether anything actually changed.
    pub fn end(&mut self, power: &mut Fsm, flags: &WakeFlags, host: &mut impl HostBus) {
        if self.rollover {
            warn!("blocked keys");
            self.keyboard.keycodes = [CODE_ROLLOVER_ERROR; 6];
            // Rollover cannot be expressed in the extra report; carry the
            // previous value forward instead of a misleading regeneration
            self.extra = *self.extra_queue.last();
        }

        power.confirm_scan(self.live_key, flags, host);

        self.keyboard_queue.push(&self.keyboard);
        self.extra_queue.push(&self.extra);
    }

    pub fn pop_keyboard(&mut self) -> Option<KeyboardReport> {
        self.keyboard_queue.pop()
    }

    pub fn pop_extra(&mut self) -> Option<ExtraKeysReport> {
        self.extra_queue.pop()
    }
}
