//! Serving + neighbour cell list
//!
//! [`CellList`] owns exactly one serving-cell slot plus a bounded, ranked
//! sequence of neighbour cells. Three invariants hold after every mutating
//! call returns:
//!
//! 1. The serving cell's identity never appears in the neighbour sequence.
//! 2. The neighbour sequence is sorted descending by [`Cell::greater`]
//!    (unmeasured cells first), except that an in-place quality update keeps
//!    its position until the next sort.
//! 3. Identities are unique within the neighbour sequence.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::cell::{Cell, CellIdentity, CellMeasurement};

/// Capacity bound of the neighbour sequence.
pub const MAX_NEIGHBOURS: usize = 8;

/// Errors from cell-list mutators.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CellListError {
    /// The identity is not present among the neighbours.
    #[error("cell {{{0}}} is not a known neighbour")]
    UnknownCell(CellIdentity),
}

/// Descending quality order: unmeasured (NaN) cells first, then stronger
/// RSRP first. Consistent total order, safe for `sort_by`.
fn quality_order(a: &Cell, b: &Cell) -> Ordering {
    match (a.rsrp().is_nan(), b.rsrp().is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => b.rsrp().partial_cmp(&a.rsrp()).unwrap_or(Ordering::Equal),
    }
}

/// The set of tracked cells: one serving slot plus ranked neighbours.
#[derive(Debug)]
pub struct CellList {
    /// Starts as the invalid placeholder; never reverts to it once a real
    /// cell has been promoted.
    serving: Cell,
    neighbours: Vec<Cell>,
    neighbour_timeout: Duration,
}

impl CellList {
    /// Creates an empty list. `neighbour_timeout` is the liveness window
    /// applied to every tracked cell.
    pub fn new(neighbour_timeout: Duration) -> Self {
        Self {
            serving: Cell::unset(neighbour_timeout),
            neighbours: Vec::new(),
            neighbour_timeout,
        }
    }

    /// The current serving cell. Invalid until the first promotion.
    pub fn serving_cell(&self) -> &Cell {
        &self.serving
    }

    /// Mutable access to the serving cell.
    pub fn serving_cell_mut(&mut self) -> &mut Cell {
        &mut self.serving
    }

    /// The ranked neighbour sequence.
    pub fn neighbours(&self) -> &[Cell] {
        &self.neighbours
    }

    /// Number of tracked neighbours.
    pub fn nof_neighbours(&self) -> usize {
        self.neighbours.len()
    }

    /// Ingests a raw measurement report.
    ///
    /// Returns false when the report is rejected: invalid identity, or a new
    /// cell that does not outrank the worst neighbour of a full list. An
    /// update to an already-tracked cell always succeeds and keeps the
    /// entry's position until the next sort.
    pub fn add_measurement_cell(&mut self, meas: &CellMeasurement) -> bool {
        let id = meas.identity();
        if !id.has_value() {
            debug!("measurement for invalid identity {{{id}}} rejected");
            return false;
        }

        // Re-confirmation of the serving cell, not a new neighbour
        if self.serving.is_valid() && self.serving.identity() == id {
            self.serving.apply_measurement(meas);
            return true;
        }

        if let Some(cell) = self.neighbours.iter_mut().find(|c| c.identity() == id) {
            cell.apply_measurement(meas);
            return true;
        }

        let candidate = Cell::from_measurement(meas, self.neighbour_timeout);
        if self.neighbours.len() >= MAX_NEIGHBOURS {
            // Sort first so the comparison sees the true current worst, not
            // whichever entry happened to be last after in-place updates.
            self.sort_neighbour_cells();
            if let Some(worst) = self.neighbours.last() {
                if !candidate.greater(worst) {
                    debug!(
                        "measurement cell {{{id}}} rejected, not better than worst neighbour {{{}}}",
                        worst.identity()
                    );
                    return false;
                }
                let evicted = self.neighbours.pop();
                if let Some(evicted) = evicted {
                    debug!("neighbour {{{}}} evicted for {{{id}}}", evicted.identity());
                }
            }
        }

        debug!(
            "new neighbour {{{id}}} rsrp={:.1}, total={}",
            meas.rsrp_dbm,
            self.neighbours.len() + 1
        );
        self.neighbours.push(candidate);
        self.sort_neighbour_cells();
        true
    }

    /// Removes and returns the matching neighbour. The serving slot is never
    /// touched by this call.
    pub fn remove_neighbour_cell(&mut self, earfcn: u32, pci: u16) -> Option<Cell> {
        let id = CellIdentity::new(earfcn, pci);
        let pos = self.neighbours.iter().position(|c| c.identity() == id)?;
        Some(self.neighbours.remove(pos))
    }

    /// Promotes a neighbour into the serving slot.
    ///
    /// A no-op success if `identity` is already serving. Fails with
    /// [`CellListError::UnknownCell`] when the cell has never been measured.
    /// Unless `discard_previous` is set, the displaced serving cell is
    /// offered back to the neighbour sequence through the same
    /// capacity/ranking policy as a fresh measurement; rejection there is
    /// expected and not an error.
    pub fn set_serving_cell(
        &mut self,
        identity: CellIdentity,
        discard_previous: bool,
    ) -> Result<(), CellListError> {
        if self.serving.is_valid() && self.serving.identity() == identity {
            return Ok(());
        }

        let pos = self
            .neighbours
            .iter()
            .position(|c| c.identity() == identity)
            .ok_or(CellListError::UnknownCell(identity))?;

        let promoted = self.neighbours.remove(pos);
        let previous = std::mem::replace(&mut self.serving, promoted);
        info!("serving cell set to {{{identity}}}");

        if previous.is_valid() && !discard_previous {
            self.reinsert_neighbour(previous);
        }
        self.sort_neighbour_cells();
        Ok(())
    }

    /// Offers a displaced cell back to the neighbour sequence under the
    /// capacity/ranking policy. Returns false when the cell lost the
    /// comparison against a full list.
    fn reinsert_neighbour(&mut self, cell: Cell) -> bool {
        if self.neighbours.len() >= MAX_NEIGHBOURS {
            self.sort_neighbour_cells();
            if let Some(worst) = self.neighbours.last() {
                if !cell.greater(worst) {
                    debug!(
                        "previous serving cell {{{}}} dropped, not better than worst neighbour",
                        cell.identity()
                    );
                    return false;
                }
                self.neighbours.pop();
            }
        }
        self.neighbours.push(cell);
        true
    }

    /// Removes every neighbour whose liveness window has elapsed.
    ///
    /// Called periodically by the owning layer; this is a cooperative sweep,
    /// not a background task.
    pub fn clean_neighbours(&mut self) {
        self.neighbours.retain(|c| {
            if c.is_stale() {
                info!("neighbour {{{}}} removed, stale", c.identity());
                false
            } else {
                true
            }
        });
    }

    /// Re-establishes the descending quality order. Idempotent; safe to call
    /// redundantly after any external mutation of quality fields.
    pub fn sort_neighbour_cells(&mut self) {
        self.neighbours.sort_by(quality_order);
    }

    /// The PCIs of all neighbours on the given carrier.
    pub fn get_neighbour_pcis(&self, earfcn: u32) -> HashSet<u16> {
        self.neighbours
            .iter()
            .filter(|c| c.identity().earfcn == earfcn)
            .map(|c| c.identity().pci)
            .collect()
    }

    /// True if the identity is currently tracked as a neighbour.
    pub fn has_neighbour_cell(&self, identity: CellIdentity) -> bool {
        self.neighbours.iter().any(|c| c.identity() == identity)
    }

    /// Looks up a cell by identity, checking the serving slot first.
    pub fn find_cell(&self, identity: CellIdentity) -> Option<&Cell> {
        if self.serving.is_valid() && self.serving.identity() == identity {
            return Some(&self.serving);
        }
        self.neighbours.iter().find(|c| c.identity() == identity)
    }
}
