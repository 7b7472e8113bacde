//! Radio-link-failure / handover-failure report builder
//!
//! Consumes a snapshot of the cell list at the moment a connection failure
//! is detected and produces an immutable report record for later
//! transmission to the network. The builder also owns the T304 mobility
//! window: while it runs, a captured report includes the elapsed time since
//! the last mobility command and the target recorded at its arrival.

use std::time::Duration;

use tracing::info;

use crate::cell::{Cell, CellIdentity};
use crate::cell_list::CellList;
use crate::timer::OneShotTimer;

/// The failure kinds a report distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Radio link failure on the serving cell
    LinkFailure,
    /// Failure while executing a mobility command
    HandoverFailure,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::LinkFailure => write!(f, "rlf"),
            FailureKind::HandoverFailure => write!(f, "hof"),
        }
    }
}

/// One measured neighbour inside a report group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighbourMeas {
    /// Physical cell id
    pub pci: u16,
    /// RSRP at capture time (dBm; NaN when never measured)
    pub rsrp_dbm: f32,
    /// RSRQ at capture time (dB; NaN when never measured)
    pub rsrq_db: f32,
}

impl NeighbourMeas {
    fn from_cell(cell: &Cell) -> Self {
        Self {
            pci: cell.identity().pci,
            rsrp_dbm: cell.rsrp(),
            rsrq_db: cell.rsrq(),
        }
    }
}

/// Neighbours on one carrier, in the rank order the cell list held them.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighbourGroup {
    /// Carrier frequency number
    pub earfcn: u32,
    /// Measurements in rank order
    pub cells: Vec<NeighbourMeas>,
}

/// Immutable snapshot captured at the moment of a connection failure.
#[derive(Debug, Clone, PartialEq)]
pub struct RlfReport {
    /// What kind of failure was detected
    pub failure_kind: FailureKind,
    /// Identity of the cell the failure occurred on (the serving cell)
    pub failed_cell: CellIdentity,
    /// Serving-cell RSRP at capture time (NaN when never measured)
    pub serving_rsrp_dbm: f32,
    /// Serving-cell RSRQ at capture time (NaN when never measured)
    pub serving_rsrq_db: f32,
    /// Ranked neighbours grouped by carrier
    pub neighbour_groups: Vec<NeighbourGroup>,
    /// Cell the device was trying to reach, when a mobility command was in
    /// flight and targeted a different cell than the serving one
    pub target_cell: Option<CellIdentity>,
    /// Time since the last mobility command, when its window was running
    pub time_since_mobility_command: Option<Duration>,
}

/// Builds failure reports from cell-list snapshots.
#[derive(Debug)]
pub struct RlfReportBuilder {
    /// T304 window armed by mobility commands
    mobility_window: OneShotTimer,
    mobility_target: Option<CellIdentity>,
    report: Option<RlfReport>,
}

impl RlfReportBuilder {
    /// Creates a builder whose mobility window runs for `t304`.
    pub fn new(t304: Duration) -> Self {
        Self {
            mobility_window: OneShotTimer::new("T304", t304),
            mobility_target: None,
            report: None,
        }
    }

    /// Records a mobility command and (re)starts its window. Calling again
    /// before expiry restarts the window.
    pub fn received_mobility_command(&mut self, target: CellIdentity) {
        self.mobility_target = Some(target);
        self.mobility_window.run();
        info!("mobility command towards {{{target}}}, window started");
    }

    /// Captures a failure snapshot from the cell list, then stops the
    /// mobility window (it has served its purpose).
    ///
    /// Missing optional data degrades to a narrower report; this call never
    /// fails.
    pub fn set_failure(&mut self, cells: &CellList, failure_kind: FailureKind) {
        let serving = cells.serving_cell();
        let failed_cell = serving.identity();

        let mut neighbour_groups: Vec<NeighbourGroup> = Vec::new();
        for cell in cells.neighbours() {
            let earfcn = cell.identity().earfcn;
            match neighbour_groups.iter_mut().find(|g| g.earfcn == earfcn) {
                Some(group) => group.cells.push(NeighbourMeas::from_cell(cell)),
                None => neighbour_groups.push(NeighbourGroup {
                    earfcn,
                    cells: vec![NeighbourMeas::from_cell(cell)],
                }),
            }
        }

        let window_open = self.mobility_window.is_running();
        let time_since_mobility_command = window_open.then(|| self.mobility_window.time_elapsed());
        let target_cell = if window_open {
            self.mobility_target.filter(|t| *t != failed_cell)
        } else {
            None
        };

        self.report = Some(RlfReport {
            failure_kind,
            failed_cell,
            serving_rsrp_dbm: serving.rsrp(),
            serving_rsrq_db: serving.rsrq(),
            neighbour_groups,
            target_cell,
            time_since_mobility_command,
        });
        self.mobility_window.stop();
        info!("{failure_kind} report captured for {{{failed_cell}}}");
    }

    /// True iff a report has been captured and not yet cleared.
    pub fn has_info(&self) -> bool {
        self.report.is_some()
    }

    /// The captured report, if any.
    pub fn report(&self) -> Option<&RlfReport> {
        self.report.as_ref()
    }

    /// Discards the captured report. Does not touch the mobility window.
    pub fn clear(&mut self) {
        self.report = None;
    }
}
