//! HID report payloads and per-channel report queues
//!
//! The byte layouts here are a compatibility contract with the host:
//! serialization is explicit and must not change.

use bitfield::bitfield;
use heapless::Deque;

bitfield! {
    /// State of HID keyboard LEDs, as delivered by the host
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct KeyboardLeds(u8);
    pub num_lock, set_num_lock: 0;
    pub caps_lock, set_caps_lock: 1;
    pub scroll_lock, set_scroll_lock: 2;
    pub compose, set_compose: 3;
    pub kana, set_kana: 4;
}

/// Report compatible with the Boot Keyboard protocol (HID spec, Appendix B)
///
/// Handles all modifier keys and up to 6 keys pressed at the same time.
/// On rollover only the key slots are overwritten with `ErrorRollOver`;
/// the modifier byte stays valid.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(test, derive(Debug))]
pub struct KeyboardReport {
    /// Modifier keys packed bits
    pub modifier: u8,
    /// Boot keyboard reserved field
    pub reserved: u8,
    /// Boot keyboard keycodes list
    pub keycodes: [u8; 6],
}

impl KeyboardReport {
    /// Exact 8-byte wire layout of the report
    pub fn as_bytes(&self) -> [u8; 8] {
        let k = &self.keycodes;
        [self.modifier, self.reserved, k[0], k[1], k[2], k[3], k[4], k[5]]
    }
}

bitfield! {
    /// System Control keys report: 16 single-bit usages from the Generic
    /// Desktop `0x80` section, bit `n` = usage `0x81 + n`
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct ExtraKeysReport(u16);
    pub power_down, set_power_down: 0;
    pub sleep, set_sleep: 1;
    pub wake_up, set_wake_up: 2;
}

#[cfg(test)]
impl core::fmt::Debug for ExtraKeysReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ExtraKeysReport({:#06x})", self.0)
    }
}

impl ExtraKeysReport {
    /// Set the bit for usage `0x81 + bit`
    pub fn set_usage_bit(&mut self, bit: u8) {
        self.0 |= 1 << bit;
    }

    /// Exact 2-byte wire layout of the report, low usages first
    pub fn as_bytes(&self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

/// Fixed-capacity queue of only-on-change report snapshots
///
/// Host polling is not synchronized with scanning, so finished reports
/// wait in a small ring until the transport pulls them. Pushing compares
/// against the previously accepted value and unchanged reports never
/// occupy a slot. When the ring is full the new report is dropped and the
/// event logged; evicting the oldest entry would silently reorder what
/// the host sees. The baseline still moves to the dropped value so the
/// scanner does not retry an identical-looking report every cycle.
///
/// Producer and consumer both run from the cooperative main loop. If the
/// queue is ever moved across execution contexts, head/tail handling
/// must become atomic.
pub struct ReportQueue<R, const N: usize> {
    queue: Deque<R, N>,
    previous: R,
}

impl<R, const N: usize> ReportQueue<R, N>
where
    R: Clone + PartialEq + Default,
{
    pub fn new() -> Self {
        Self {
            queue: Deque::new(),
            previous: R::default(),
        }
    }

    /// Enqueue a finished report if it differs from the previous one.
    /// Returns whether the report was considered a change.
    pub fn push(&mut self, report: &R) -> bool {
        if *report == self.previous {
            return false;
        }
        if self.queue.push_back(report.clone()).is_err() {
            warn!("report queue full, dropping");
        }
        self.previous = report.clone();
        true
    }

    /// Pop the oldest unread report
    pub fn pop(&mut self) -> Option<R> {
        self.queue.pop_front()
    }

    /// Last value accepted by [`Self::push`]
    pub fn last(&self) -> &R {
        &self.previous
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<R, const N: usize> Default for ReportQueue<R, N>
where
    R: Clone + PartialEq + Default,
{
    fn default() -> Self {
        Self::new()
    }
}
