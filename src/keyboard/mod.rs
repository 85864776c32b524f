//! Keyboard controller core
//!
//! Ties the whole pipeline together: matrix sampling and debouncing,
//! ghost detection, translation of settled keys into HID reports, the
//! per-channel report queues and the sleep/wake coordinator.
//!
//! Everything runs from one cooperative main loop. The embedding
//! firmware calls [`Keyboard::scan_tick`] on a fixed period
//! ([`crate::config::SCAN_PERIOD_MS`]), polls the transport and drains
//! the queues via [`Keyboard::dequeue_keyboard`]/[`Keyboard::dequeue_extra`],
//! and brackets the platform sleep instruction with
//! [`Keyboard::maybe_sleep`] and [`Keyboard::on_wakeup`]. Interrupt
//! contexts never call into [`Keyboard`]; they only touch
//! [`power::WakeFlags`] and [`crate::time::MillisClock`].

/// HID report payloads and report queues
pub mod hid;
/// Matrix sampling, debouncing and ghost detection
pub mod matrix;
/// Sleep/wake coordination
pub mod power;
/// Scan point to report translation
pub mod scan;

use crate::config::{Keymap, NROWS, ScanPoint};
use hid::{ExtraKeysReport, KeyboardLeds, KeyboardReport};
use matrix::{Matrix, MatrixDriver};
use power::{HostBus, WakeFlags};
use scan::ScanProcessor;

/// Indicator LEDs driven from host output reports
pub trait Indicators {
    /// Boot-protocol LED byte (num lock, caps lock, ...)
    fn set_keyboard_leds(&mut self, leds: KeyboardLeds);

    /// Extra LED usages outside the boot LED byte (mute, suspend, ...),
    /// ordered by usage number
    fn set_extra_leds(&mut self, _state: u8) {}
}

/// The complete controller core for one keyboard
pub struct Keyboard<D: MatrixDriver> {
    matrix: Matrix<D>,
    scan: ScanProcessor,
    power: power::Fsm,
    leds: KeyboardLeds,
}

impl<D: MatrixDriver> Keyboard<D> {
    pub fn new(driver: D, keymap: &'static Keymap) -> Self {
        Self {
            matrix: Matrix::new(driver),
            scan: ScanProcessor::new(keymap),
            power: power::Fsm::with(),
            leds: KeyboardLeds(0),
        }
    }

    /// Run one full scan cycle: debounce every column, check for
    /// ghosting, translate settled keys and enqueue finished reports
    pub fn scan_tick(&mut self, flags: &WakeFlags, host: &mut impl HostBus) {
        self.scan.begin();

        let settled = self.matrix.scan();
        for (col, &mask) in settled.iter().enumerate() {
            if mask == 0 {
                continue;
            }
            for row in 0..NROWS {
                if mask & (1 << row) != 0 {
                    let point = (col * NROWS + row) as ScanPoint;
                    trace!("live key {}", point);
                    self.scan.add_point(point);
                }
            }
        }

        if matrix::has_blocked_keys(&settled) {
            self.scan.invalidate();
        }

        self.scan.end(&mut self.power, flags, host);
    }

    /// Next queued keyboard report, unless inside the post-wake
    /// suppression window
    pub fn dequeue_keyboard(&mut self, now: u32) -> Option<KeyboardReport> {
        if self.power.reports_suppressed(now) {
            return None;
        }
        self.scan.pop_keyboard()
    }

    /// Next queued system-control report, unless inside the post-wake
    /// suppression window
    pub fn dequeue_extra(&mut self, now: u32) -> Option<ExtraKeysReport> {
        if self.power.reports_suppressed(now) {
            return None;
        }
        self.scan.pop_extra()
    }

    /// Sleep-entry check, to be called once per main loop turn. When this
    /// returns true the caller must execute the platform sleep
    /// instruction and then call [`Self::on_wakeup`].
    pub fn maybe_sleep(&mut self, flags: &WakeFlags) -> bool {
        self.power.maybe_sleep(flags, self.matrix.driver_mut())
    }

    /// To be called immediately on return from the sleep instruction
    pub fn on_wakeup(&mut self, now: u32, flags: &WakeFlags) {
        self.power.on_wakeup(now, flags, self.matrix.driver_mut())
    }

    /// Forward a host LED output report to the indicator hardware
    pub fn set_led_state(&mut self, state: u8, indicators: &mut impl Indicators) {
        debug!("set leds {}", state);
        self.leds = KeyboardLeds(state);
        indicators.set_keyboard_leds(self.leds);
    }

    /// Forward a host extra-LED output report to the indicator hardware
    pub fn set_extra_led_state(&mut self, state: u8, indicators: &mut impl Indicators) {
        debug!("set extra leds {}", state);
        indicators.set_extra_leds(state);
    }

    /// Current host-side LED state
    pub fn leds(&self) -> KeyboardLeds {
        self.leds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KEY_COUNT, NCOLS, RowMask, WAKE_SUPPRESS_MS};

    static KEYMAP: Keymap = {
        let mut map = [0u8; KEY_COUNT];
        let mut i = 0;
        // plain codes everywhere, a modifier on scan point 14
        while i < KEY_COUNT {
            map[i] = 0x04 + (i % 0x40) as u8;
            i += 1;
        }
        map[14] = 0xe0; // LCtrl
        map
    };

    struct TestMatrix {
        rows: [RowMask; NCOLS],
        all_columns: bool,
        column: usize,
    }

    impl TestMatrix {
        fn new() -> Self {
            Self {
                rows: [0; NCOLS],
                all_columns: false,
                column: 0,
            }
        }

        fn press(&mut self, point: usize) {
            self.rows[point / NROWS] |= 1 << (point % NROWS);
        }

        fn release(&mut self, point: usize) {
            self.rows[point / NROWS] &= !(1 << (point % NROWS));
        }
    }

    impl MatrixDriver for TestMatrix {
        fn activate_column(&mut self, col: u8) {
            self.all_columns = false;
            self.column = col as usize;
        }

        fn activate_all_columns(&mut self) {
            self.all_columns = true;
        }

        fn sample_rows(&mut self) -> RowMask {
            if self.all_columns {
                self.rows.iter().fold(0, |acc, r| acc | r)
            } else {
                self.rows[self.column]
            }
        }
    }

    #[derive(Default)]
    struct TestBus {
        wakeups: usize,
    }

    impl HostBus for TestBus {
        fn request_remote_wakeup(&mut self) {
            self.wakeups += 1;
        }
    }

    #[derive(Default)]
    struct TestLeds {
        keyboard: u8,
        extra: u8,
    }

    impl Indicators for TestLeds {
        fn set_keyboard_leds(&mut self, leds: KeyboardLeds) {
            self.keyboard = leds.0;
        }

        fn set_extra_leds(&mut self, state: u8) {
            self.extra = state;
        }
    }

    fn ticks(kbd: &mut Keyboard<TestMatrix>, flags: &WakeFlags, bus: &mut TestBus, n: usize) {
        for _ in 0..n {
            kbd.scan_tick(flags, bus);
        }
    }

    #[test]
    fn press_and_release_end_to_end() {
        let mut kbd = Keyboard::new(TestMatrix::new(), &KEYMAP);
        let flags = WakeFlags::new();
        let mut bus = TestBus::default();

        kbd.matrix.driver_mut().press(5);
        ticks(&mut kbd, &flags, &mut bus, 5);

        let report = kbd.dequeue_keyboard(0).unwrap();
        assert_eq!(report.as_bytes(), [0x00, 0x00, 0x09, 0, 0, 0, 0, 0]);
        assert!(kbd.dequeue_keyboard(0).is_none());

        kbd.matrix.driver_mut().release(5);
        ticks(&mut kbd, &flags, &mut bus, 5);

        let report = kbd.dequeue_keyboard(0).unwrap();
        assert_eq!(report.as_bytes(), [0; 8]);
        assert!(kbd.dequeue_keyboard(0).is_none());
    }

    #[test]
    fn modifier_and_key_combine() {
        let mut kbd = Keyboard::new(TestMatrix::new(), &KEYMAP);
        let flags = WakeFlags::new();
        let mut bus = TestBus::default();

        kbd.matrix.driver_mut().press(14); // LCtrl
        kbd.matrix.driver_mut().press(16); // first key of column 2
        ticks(&mut kbd, &flags, &mut bus, 5);

        let report = kbd.dequeue_keyboard(0).unwrap();
        assert_eq!(report.modifier, 1 << 0);
        assert_eq!(report.keycodes[0], KEYMAP[16]);
    }

    #[test]
    fn ghosted_combination_reports_phantoms() {
        let mut kbd = Keyboard::new(TestMatrix::new(), &KEYMAP);
        let flags = WakeFlags::new();
        let mut bus = TestBus::default();

        // L shape (c2,r0), (c2,r1), (c5,r0): a diodeless matrix reads the
        // phantom (c5,r1) as pressed too, so both columns share two rows
        kbd.matrix.driver_mut().press(2 * NROWS);
        kbd.matrix.driver_mut().press(2 * NROWS + 1);
        kbd.matrix.driver_mut().press(5 * NROWS);
        kbd.matrix.driver_mut().press(5 * NROWS + 1);
        ticks(&mut kbd, &flags, &mut bus, 5);

        let report = kbd.dequeue_keyboard(0).unwrap();
        assert_eq!(report.keycodes, [0x01; 6]);
    }

    #[test]
    fn sleep_wake_key_confirmation() {
        let mut kbd = Keyboard::new(TestMatrix::new(), &KEYMAP);
        let flags = WakeFlags::new();
        let mut bus = TestBus::default();

        flags.on_host_suspend();
        assert!(kbd.maybe_sleep(&flags));
        assert!(kbd.matrix.driver_mut().all_columns);

        // a key press wakes us; confirmation scans see it settle
        kbd.matrix.driver_mut().press(5);
        kbd.on_wakeup(1000, &flags);
        ticks(&mut kbd, &flags, &mut bus, 4);
        assert_eq!(bus.wakeups, 1);
        // the host never resumed, so the re-armed suspend flag sends us
        // right back down
        assert!(kbd.maybe_sleep(&flags));
    }

    #[test]
    fn spurious_wake_returns_to_sleep() {
        let mut kbd = Keyboard::new(TestMatrix::new(), &KEYMAP);
        let flags = WakeFlags::new();
        let mut bus = TestBus::default();

        flags.on_host_suspend();
        assert!(kbd.maybe_sleep(&flags));
        kbd.on_wakeup(1000, &flags);

        ticks(&mut kbd, &flags, &mut bus, 4);
        assert_eq!(bus.wakeups, 0);
        assert!(kbd.maybe_sleep(&flags));
    }

    #[test]
    fn reports_suppressed_after_wake() {
        let mut kbd = Keyboard::new(TestMatrix::new(), &KEYMAP);
        let flags = WakeFlags::new();
        let mut bus = TestBus::default();

        flags.on_host_suspend();
        assert!(kbd.maybe_sleep(&flags));
        kbd.matrix.driver_mut().press(5);
        kbd.on_wakeup(1000, &flags);
        ticks(&mut kbd, &flags, &mut bus, 5);

        assert!(kbd.dequeue_keyboard(1000 + WAKE_SUPPRESS_MS - 1).is_none());
        assert!(kbd.dequeue_keyboard(1000 + WAKE_SUPPRESS_MS).is_some());
    }

    #[test]
    fn led_pass_through() {
        let mut kbd = Keyboard::new(TestMatrix::new(), &KEYMAP);
        let mut leds = TestLeds::default();

        kbd.set_led_state(0b0000_0011, &mut leds);
        assert_eq!(leds.keyboard, 0b0000_0011);
        assert!(kbd.leds().num_lock());
        assert!(kbd.leds().caps_lock());
        assert!(!kbd.leds().scroll_lock());

        kbd.set_extra_led_state(0x04, &mut leds);
        assert_eq!(leds.extra, 0x04);
    }
}
