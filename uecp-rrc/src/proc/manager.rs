//! Procedure manager
//!
//! Owns the storage of all concurrently active procedures and runs them to
//! completion. Sub-procedure launches requested through the deferred action
//! queue are performed here, after the requesting call has returned, and
//! sub-procedure completions are routed into waiting parents as events.

use tracing::debug;

use crate::proc::cell_selection::{CellSelectionError, CellSelectionProc, SelectedCell};
use crate::proc::connection_setup::ConnectionSetupProc;
use crate::proc::reconfiguration::ReconfigurationProc;
use crate::proc::setup_request::{SetupRequestEvent, SetupRequestProc};
use crate::proc::{DeferredAction, ProcHandle, RrcContext};

/// Runs the currently active procedures to completion.
#[derive(Debug, Default)]
pub struct ProcManager {
    /// Cell search / select / system-information acquisition
    pub cell_selection: ProcHandle<CellSelectionProc>,
    /// Connection establishment
    pub setup_request: ProcHandle<SetupRequestProc>,
    /// Connection setup (configuration + completion message)
    pub connection_setup: ProcHandle<ConnectionSetupProc>,
    /// Connection reconfiguration
    pub reconfiguration: ProcHandle<ReconfigurationProc>,
}

impl ProcManager {
    /// Creates a manager with all procedure slots idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Performs deferred work queued by procedures during the last dispatch.
    pub fn drain_actions(&mut self, ctx: &mut RrcContext<'_>) {
        while let Some(action) = ctx.actions.pop_front() {
            match action {
                DeferredAction::StartCellSelection(args) => {
                    if self.cell_selection.is_busy() {
                        // A selection already in flight serves the waiting
                        // parent through the normal completion routing.
                        debug!("cell selection already in flight, awaiting it");
                        continue;
                    }
                    match self.cell_selection.launch(ctx, CellSelectionProc::new(args)) {
                        Ok(Some(result)) => self.on_cell_selection_complete(ctx, result),
                        Ok(None) => {}
                        Err(e) => debug!("cell selection launch rejected: {e}"),
                    }
                }
            }
        }
    }

    /// Routes a cell-selection completion to the procedure awaiting it.
    pub fn on_cell_selection_complete(
        &mut self,
        ctx: &mut RrcContext<'_>,
        result: Result<SelectedCell, CellSelectionError>,
    ) {
        if self.setup_request.is_busy() {
            let _ = self
                .setup_request
                .trigger(ctx, SetupRequestEvent::CellSelectionOutcome(result));
        } else {
            debug!("cell selection completed with no parent waiting");
        }
    }

    /// Re-polls every busy procedure once.
    pub fn step_all(&mut self, ctx: &mut RrcContext<'_>) {
        if let Some(result) = self.cell_selection.step(ctx) {
            self.on_cell_selection_complete(ctx, result);
        }
        let _ = self.setup_request.step(ctx);
        let _ = self.connection_setup.step(ctx);
        let _ = self.reconfiguration.step(ctx);
    }

    /// True while any procedure slot is busy.
    pub fn any_busy(&self) -> bool {
        self.cell_selection.is_busy()
            || self.setup_request.is_busy()
            || self.connection_setup.is_busy()
            || self.reconfiguration.is_busy()
    }
}
