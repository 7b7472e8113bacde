//! Radio-cell candidate model
//!
//! A [`Cell`] is a single candidate radio cell: its identity, the latest
//! signal-quality snapshot, which system-information blocks have been
//! decoded for it, and a liveness timer that marks the cell stale when no
//! fresh RSRP report arrives.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::timer::OneShotTimer;

/// Number of physical cell identities; PCIs are valid in `0..PCI_MAX`.
pub const PCI_MAX: u16 = 1008;

/// Number of tracked system-information blocks. Index 0 corresponds to SIB1.
pub const MAX_SIBS: usize = 16;

/// Identity of a radio cell: carrier frequency plus physical cell id.
///
/// The default value is the null identity used for unpopulated slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellIdentity {
    /// Carrier frequency number (EARFCN/ARFCN); 0 marks an unpopulated slot
    pub earfcn: u32,
    /// Physical cell id, valid in `0..PCI_MAX`
    pub pci: u16,
}

impl CellIdentity {
    /// Creates a cell identity.
    pub const fn new(earfcn: u32, pci: u16) -> Self {
        Self { earfcn, pci }
    }

    /// Returns true if this identity denotes a real cell.
    pub fn has_value(&self) -> bool {
        self.earfcn != 0 && self.pci < PCI_MAX
    }
}

impl fmt::Display for CellIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "earfcn={}, pci={}", self.earfcn, self.pci)
    }
}

/// A raw measurement report for one cell, as delivered by the lower layers.
#[derive(Debug, Clone, Copy)]
pub struct CellMeasurement {
    /// Carrier frequency number
    pub earfcn: u32,
    /// Physical cell id
    pub pci: u16,
    /// Reference signal received power (dBm)
    pub rsrp_dbm: f32,
    /// Reference signal received quality (dB)
    pub rsrq_db: f32,
    /// Carrier frequency offset (Hz)
    pub cfo_hz: f32,
}

impl CellMeasurement {
    /// The identity this measurement refers to.
    pub fn identity(&self) -> CellIdentity {
        CellIdentity::new(self.earfcn, self.pci)
    }
}

/// System-information decode state for one cell.
///
/// Tracks which broadcast blocks have been decoded plus the schedule map of
/// which broadcast cycle carries which block.
#[derive(Debug, Clone, Default)]
pub struct SysInfoState {
    present: [bool; MAX_SIBS],
    /// SIB index -> broadcast periodicity in ms
    schedule: HashMap<usize, u32>,
}

impl SysInfoState {
    /// True if the block at `index` has been decoded. Out-of-range is false.
    pub fn has_sib(&self, index: usize) -> bool {
        self.present.get(index).copied().unwrap_or(false)
    }

    /// True if every listed block has been decoded.
    pub fn has_sibs(&self, indices: &[usize]) -> bool {
        indices.iter().all(|&i| self.has_sib(i))
    }

    /// Marks the block at `index` as decoded. Out-of-range is ignored.
    pub fn set_sib(&mut self, index: usize) {
        if let Some(flag) = self.present.get_mut(index) {
            *flag = true;
        }
    }

    /// Records which broadcast cycle carries the block at `index`.
    pub fn set_schedule(&mut self, index: usize, period_ms: u32) {
        if index < MAX_SIBS {
            self.schedule.insert(index, period_ms);
        }
    }

    /// The broadcast periodicity recorded for `index`, if any.
    pub fn schedule_of(&self, index: usize) -> Option<u32> {
        self.schedule.get(&index).copied()
    }

    /// Forgets all decode state and scheduling.
    pub fn reset(&mut self) {
        self.present = [false; MAX_SIBS];
        self.schedule.clear();
    }
}

/// A tracked radio-cell candidate.
#[derive(Debug, Clone)]
pub struct Cell {
    identity: CellIdentity,
    /// NaN until the first valid measurement arrives
    rsrp_dbm: f32,
    rsrq_db: f32,
    cfo_hz: f32,
    sys_info: SysInfoState,
    liveness: OneShotTimer,
}

impl Cell {
    /// Creates a cell for a newly discovered identity with a fresh liveness
    /// window already running.
    pub fn new(identity: CellIdentity, liveness_timeout: Duration) -> Self {
        let mut liveness = OneShotTimer::new("cell-liveness", liveness_timeout);
        liveness.run();
        Self {
            identity,
            rsrp_dbm: f32::NAN,
            rsrq_db: f32::NAN,
            cfo_hz: 0.0,
            sys_info: SysInfoState::default(),
            liveness,
        }
    }

    /// Creates the unpopulated placeholder used for an empty serving slot.
    pub fn unset(liveness_timeout: Duration) -> Self {
        Self {
            identity: CellIdentity::default(),
            rsrp_dbm: f32::NAN,
            rsrq_db: f32::NAN,
            cfo_hz: 0.0,
            sys_info: SysInfoState::default(),
            liveness: OneShotTimer::new("cell-liveness", liveness_timeout),
        }
    }

    /// Creates a cell from a raw measurement report.
    pub fn from_measurement(meas: &CellMeasurement, liveness_timeout: Duration) -> Self {
        let mut cell = Self::new(meas.identity(), liveness_timeout);
        cell.apply_measurement(meas);
        cell
    }

    /// True iff the identity is non-null.
    pub fn is_valid(&self) -> bool {
        self.identity.has_value()
    }

    /// The cell identity.
    pub fn identity(&self) -> CellIdentity {
        self.identity
    }

    /// Latest RSRP sample in dBm; NaN until measured.
    pub fn rsrp(&self) -> f32 {
        self.rsrp_dbm
    }

    /// Latest RSRQ sample in dB; NaN until measured.
    pub fn rsrq(&self) -> f32 {
        self.rsrq_db
    }

    /// Latest carrier frequency offset in Hz.
    pub fn cfo(&self) -> f32 {
        self.cfo_hz
    }

    /// Records an RSRP sample. Non-finite samples leave the stored value
    /// unchanged, but every report restarts the liveness window: even an
    /// unusable sample is evidence the cell is still observable.
    pub fn set_rsrp(&mut self, value: f32) {
        if value.is_finite() {
            self.rsrp_dbm = value;
        }
        self.liveness.run();
    }

    /// Records an RSRQ sample; non-finite samples are ignored.
    pub fn set_rsrq(&mut self, value: f32) {
        if value.is_finite() {
            self.rsrq_db = value;
        }
    }

    /// Records a CFO sample; non-finite samples are ignored.
    pub fn set_cfo(&mut self, value: f32) {
        if value.is_finite() {
            self.cfo_hz = value;
        }
    }

    /// Writes a full measurement through the individual setters.
    pub fn apply_measurement(&mut self, meas: &CellMeasurement) {
        self.set_rsrp(meas.rsrp_dbm);
        self.set_rsrq(meas.rsrq_db);
        self.set_cfo(meas.cfo_hz);
    }

    /// Ranking relation: true if this cell outranks `other`.
    ///
    /// An unmeasured cell (NaN RSRP) sorts ahead of any measured one so that
    /// it gets a chance to be measured rather than being starved out of a
    /// full list. This is a policy choice, not a numeric accident.
    pub fn greater(&self, other: &Cell) -> bool {
        self.rsrp_dbm > other.rsrp_dbm || self.rsrp_dbm.is_nan()
    }

    /// True if the block at `index` has been decoded for this cell.
    pub fn has_sib(&self, index: usize) -> bool {
        self.sys_info.has_sib(index)
    }

    /// True if every listed block has been decoded for this cell.
    pub fn has_sibs(&self, indices: &[usize]) -> bool {
        self.sys_info.has_sibs(indices)
    }

    /// System-information decode state.
    pub fn sys_info(&self) -> &SysInfoState {
        &self.sys_info
    }

    /// Mutable system-information decode state.
    pub fn sys_info_mut(&mut self) -> &mut SysInfoState {
        &mut self.sys_info
    }

    /// True once the liveness window has elapsed without a fresh RSRP report.
    pub fn is_stale(&self) -> bool {
        self.liveness.has_expired()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cell {{{}}} rsrp={:.1} rsrq={:.1}",
            self.identity, self.rsrp_dbm, self.rsrq_db
        )
    }
}
