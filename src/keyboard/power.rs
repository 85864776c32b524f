//! Sleep/wake coordination
//!
//! When the host bus goes idle the controller is parked in its deepest
//! sleep state with all columns strobed, so that any keypress raises a
//! row interrupt. A row interrupt cannot distinguish a real keypress from
//! electrical noise, and the row sample that triggered it is consumed by
//! hardware before software runs. The wake cause is therefore an
//! inference: a bus wake is recorded by the transport's resume event, and
//! everything else is assumed to be a key. The authoritative decision is
//! deferred to the ordinary scan pipeline: a few confirmation scans after
//! waking either observe a live debounced key (and request a bus remote
//! wake) or conclude the wake was spurious and go back to sleep.

use core::sync::atomic::{AtomicBool, Ordering};

use smlang::statemachine;

use crate::config::{WAKE_CONFIRM_SCANS, WAKE_SUPPRESS_MS};
use crate::time::deadline_passed;
use super::matrix::MatrixDriver;

/// Host bus operations needed by the sleep/wake coordinator
pub trait HostBus {
    /// Signal the host to leave its own low-power state (remote wakeup).
    /// Called unconditionally; a transport whose host has not enabled
    /// remote wakeup may refuse.
    fn request_remote_wakeup(&mut self);
}

/// Flags shared between interrupt contexts and the main loop
///
/// Interrupt handlers only set or clear individual flags here; all
/// multi-step decisions happen in the main loop. Every field is a single
/// atomic, so no further synchronization is needed.
pub struct WakeFlags {
    /// The host wants us asleep (or a confirmation round re-armed it)
    suspend: AtomicBool,
    /// A bus resume event arrived; while asleep this records the wake cause
    bus_wake: AtomicBool,
}

impl WakeFlags {
    pub const fn new() -> Self {
        Self {
            suspend: AtomicBool::new(false),
            bus_wake: AtomicBool::new(false),
        }
    }

    /// Host went idle; call from the transport suspend event
    pub fn on_host_suspend(&self) {
        self.suspend.store(true, Ordering::Relaxed);
    }

    /// Host woke up; call from the transport resume event
    pub fn on_host_resume(&self) {
        self.suspend.store(false, Ordering::Relaxed);
        self.bus_wake.store(true, Ordering::Relaxed);
    }

    fn request_suspend(&self) {
        self.suspend.store(true, Ordering::Relaxed);
    }

    fn take_suspend(&self) -> bool {
        self.suspend.swap(false, Ordering::Relaxed)
    }

    fn take_bus_wake(&self) -> bool {
        self.bus_wake.swap(false, Ordering::Relaxed)
    }

    fn clear_wake_cause(&self) {
        self.bus_wake.store(false, Ordering::Relaxed);
    }
}

impl Default for WakeFlags {
    fn default() -> Self {
        Self::new()
    }
}

pub type Fsm = StateMachine<Context>;

statemachine! {
    transitions: {
        *Awake + HostIdle = EnteringSleep,
        EnteringSleep + SleepArmed = AsleepWaitingForWake,

        // Exactly one wake cause is recorded on return from sleep
        AsleepWaitingForWake + BusWake = Awake,
        AsleepWaitingForWake + KeyWake / reset_confirmation = ConfirmingWake,

        ConfirmingWake + KeyConfirmed / reset_confirmation = Awake,
        ConfirmingWake + ConfirmTimeout / reset_confirmation = Awake,
        ConfirmingWake + BusResume / reset_confirmation = Awake,
        ConfirmingWake + HostIdle / reset_confirmation = EnteringSleep,
    }
}

pub struct Context {
    /// Confirmation scans left; `None` until the first confirmation scan
    /// after a wake arms the budget
    retries: Option<u8>,
    /// Deadline of the post-wake report suppression window
    suppress_until: Option<u32>,
}

impl StateMachineContext for Context {
    fn reset_confirmation(&mut self) {
        self.retries = None;
    }
}

impl StateMachine<Context> {
    pub fn with() -> Self {
        Self::new(Context {
            retries: None,
            suppress_until: None,
        })
    }

    /// Cooperative sleep-entry check, to be called once per main loop turn
    ///
    /// Returns true when the caller must execute the platform sleep
    /// instruction; the matrix and wake flags are already armed at that
    /// point. [`Self::on_wakeup`] must be called on return from sleep.
    pub fn maybe_sleep(&mut self, flags: &WakeFlags, matrix: &mut impl MatrixDriver) -> bool {
        if flags.take_suspend() {
            self.process_event(Events::HostIdle).ok();
        }
        if !matches!(self.state(), States::EnteringSleep) {
            return false;
        }

        info!("sleeping");
        // With every column strobed, any key press shows up on the rows
        // and can raise the wake interrupt
        matrix.activate_all_columns();
        matrix.configure_for_sleep();
        // One of these will be set again by whatever wakes us
        flags.clear_wake_cause();

        self.process_event(Events::SleepArmed).ok();
        true
    }

    /// Record the wake cause and arm the report suppression window;
    /// called immediately on return from the sleep instruction
    pub fn on_wakeup(&mut self, now: u32, flags: &WakeFlags, matrix: &mut impl MatrixDriver) {
        matrix.configure_for_wake();

        // Armed for every wake cause: the physical disturbance that woke
        // us is still bouncing right now
        self.context.suppress_until = Some(now.wrapping_add(WAKE_SUPPRESS_MS));

        if flags.take_bus_wake() {
            info!("WAKE: bus");
            self.process_event(Events::BusWake).ok();
        } else {
            // The triggering row sample was consumed by hardware; a key
            // wake is inferred and must be confirmed by real scans
            info!("WAKE: key");
            self.process_event(Events::KeyWake).ok();
        }
    }

    /// Wake-confirmation step, run at the end of every scan cycle
    pub fn confirm_scan(&mut self, live_key: bool, flags: &WakeFlags, host: &mut impl HostBus) {
        if !matches!(self.state(), States::ConfirmingWake) {
            return;
        }

        if flags.take_bus_wake() {
            // Host resumed on its own; nothing left to confirm
            self.process_event(Events::BusResume).ok();
            return;
        }

        if live_key {
            info!("wake confirmed, requesting remote wakeup");
            // Re-arm sleep before signalling: the host may still be
            // suspended for another round-trip, and its resume event is
            // what clears the flag again
            flags.request_suspend();
            host.request_remote_wakeup();
            self.process_event(Events::KeyConfirmed).ok();
        } else {
            let retries = self.context.retries.get_or_insert(WAKE_CONFIRM_SCANS);
            *retries -= 1;
            if *retries == 0 {
                info!("spurious wake, going back to sleep");
                flags.request_suspend();
                self.process_event(Events::ConfirmTimeout).ok();
            }
        }
    }

    /// True while freshly queued reports must still be withheld after a wake
    pub fn reports_suppressed(&mut self, now: u32) -> bool {
        match self.context.suppress_until {
            None => false,
            Some(deadline) if deadline_passed(now, deadline) => {
                self.context.suppress_until = None;
                false
            }
            Some(_) => true,
        }
    }
}
