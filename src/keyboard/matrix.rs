//! Matrix sampling, debouncing and ghost detection
//!
//! One scan pass strobes every column in turn and reads the row lines,
//! keeping a short history of raw samples per column. The settled state
//! is recomputed from scratch every cycle; nothing here is mutated
//! incrementally. An idle matrix is detected up front by strobing all
//! columns at once, which skips the per-column pass entirely.

use crate::config::{DEBOUNCE_WINDOW, NCOLS, RowMask};

/// Low-level access to the key matrix strobe and sense lines
///
/// Implementations own any electrical settling delays needed after
/// changing the strobed column.
pub trait MatrixDriver {
    /// Strobe a single column, deactivating all others
    fn activate_column(&mut self, col: u8);

    /// Strobe every column at once, so that any pressed key anywhere in
    /// the matrix shows up on the row lines. Used to short-circuit idle
    /// scans and to arm the widest possible wake trigger before sleep.
    fn activate_all_columns(&mut self);

    /// Read the bitmask of active rows for the current strobe state
    fn sample_rows(&mut self) -> RowMask;

    /// Reconfigure row-change interrupt sources before entering sleep
    fn configure_for_sleep(&mut self) {}

    /// Undo the sleep interrupt configuration after waking
    fn configure_for_wake(&mut self) {}
}

/// Fixed-window debounce filter
///
/// Keeps the last `W` raw row masks per column in a circular log. A row
/// bit is settled-active when it was active in at least 2 of the `W`
/// samples, computed as the OR of all pairwise ANDs across the window.
/// 2-of-4 is deliberately more tolerant than 3-of-4: a fast tap must not
/// be missed, while a single-sample noise spike still never gets through.
pub struct Debouncer<const COLS: usize, const W: usize> {
    history: [[RowMask; COLS]; W],
    slot: usize,
}

impl<const COLS: usize, const W: usize> Debouncer<COLS, W> {
    pub const fn new() -> Self {
        Self {
            history: [[0; COLS]; W],
            slot: 0,
        }
    }

    /// Start a new cycle: the oldest window slot is cleared and becomes
    /// the current one. Columns that are not recorded afterwards stay at
    /// zero for this cycle, so a released key still debounces out within
    /// one window rotation even when sampling is short-circuited.
    pub fn rotate(&mut self) {
        self.slot = (self.slot + 1) % W;
        self.history[self.slot] = [0; COLS];
    }

    /// Store the raw sample for one column in the current slot
    pub fn record(&mut self, col: usize, sample: RowMask) {
        self.history[self.slot][col] = sample;
    }

    /// Settled row mask for one column over the whole window
    pub fn settled(&self, col: usize) -> RowMask {
        let mut mask = 0;
        for i in 0..W {
            for j in (i + 1)..W {
                mask |= self.history[i][col] & self.history[j][col];
            }
        }
        mask
    }
}

impl<const COLS: usize, const W: usize> Default for Debouncer<COLS, W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Key matrix scanner combining a [`MatrixDriver`] with debouncing
pub struct Matrix<D> {
    driver: D,
    debouncer: Debouncer<NCOLS, DEBOUNCE_WINDOW>,
}

impl<D: MatrixDriver> Matrix<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            debouncer: Debouncer::new(),
        }
    }

    /// Run one sampling pass and return this cycle's settled row masks
    ///
    /// If the all-columns probe reads zero the column-by-column strobe is
    /// skipped; the history still rotates with all-zero samples.
    pub fn scan(&mut self) -> [RowMask; NCOLS] {
        self.debouncer.rotate();

        self.driver.activate_all_columns();
        if self.driver.sample_rows() != 0 {
            for col in 0..NCOLS {
                self.driver.activate_column(col as u8);
                self.debouncer.record(col, self.driver.sample_rows());
            }
        }

        let mut settled = [0; NCOLS];
        for (col, mask) in settled.iter_mut().enumerate() {
            *mask = self.debouncer.settled(col);
        }
        settled
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

/// Check the settled masks of one cycle for the diodeless-matrix ghost
/// condition: two columns sharing at least two active rows. Three keys in
/// an "L" across two columns and two rows are then indistinguishable from
/// a phantom fourth key, so the whole cycle must be reported invalid.
pub fn has_blocked_keys(settled: &[RowMask]) -> bool {
    for (i, &a) in settled.iter().enumerate() {
        if count_capped(a) < 2 {
            continue;
        }
        for &b in &settled[i + 1..] {
            if count_capped(a & b) >= 2 {
                return true;
            }
        }
    }
    false
}

// Population count terminating at two; the exact count beyond that is
// irrelevant to ghost detection.
fn count_capped(mask: RowMask) -> u8 {
    let mut n = mask;
    let mut count = 0;
    while n != 0 && count < 2 {
        count += 1;
        n &= n - 1;
    }
    count
}
