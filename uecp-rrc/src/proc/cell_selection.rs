//! Cell selection procedure
//!
//! Drives a device from "no cell" to "camped with system information":
//! start a cell search, validate the result, push a derived physical-layer
//! configuration, camp on the cell, then wait for the first
//! system-information block to be decoded.
//!
//! Any rejection at any stage terminates the procedure with a typed error;
//! retry policy belongs to the caller.

use thiserror::Error;
use tracing::{debug, info};

use crate::cell::{CellIdentity, CellMeasurement};
use crate::interfaces::{CellSearchArgs, CellSearchResult, CellSelectStatus, PhyConfig};
use crate::proc::{ProcOutcome, Procedure, RrcContext};

/// Index of the first system-information block in the decode-state flags.
const SIB1_INDEX: usize = 0;

/// States of the cell selection procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellSelectionState {
    /// Waiting for the cell-search result
    Searching,
    /// Waiting for the cell-select result
    Selecting,
    /// Camped, waiting for the first system-information block
    AcquiringSysInfo,
}

/// Events consumed by cell selection.
#[derive(Debug)]
pub enum CellSelectionEvent {
    /// Result of the cell search
    SearchResult(CellSearchResult),
    /// Result of the camp attempt
    SelectResult(CellSelectStatus),
    /// Whether the first system-information block was decoded
    SibDecoded(bool),
}

/// Terminal errors of cell selection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CellSelectionError {
    /// The lower layer refused to start the search.
    #[error("cell search could not be started")]
    SearchStartRejected,
    /// The search finished without finding a cell.
    #[error("no cell found")]
    NoCellFound,
    /// The broadcast fragment could not be decoded.
    #[error("cell {{{0}}} has no usable broadcast information")]
    NoBroadcastInfo(CellIdentity),
    /// The found cell bars new connections.
    #[error("cell {{{0}}} is barred")]
    CellBarred(CellIdentity),
    /// The found cell uses a configuration this UE does not support.
    #[error("cell {{{0}}} uses an unsupported configuration")]
    UnsupportedConfig(CellIdentity),
    /// The derived physical-layer configuration was rejected.
    #[error("physical-layer configuration for cell {{{0}}} rejected")]
    PhyConfigRejected(CellIdentity),
    /// The lower layer refused to start the camp attempt.
    #[error("cell select on {{{0}}} could not be started")]
    SelectStartRejected(CellIdentity),
    /// The camp attempt failed.
    #[error("cell select on {{{0}}} failed")]
    SelectFailed(CellIdentity),
    /// System information could not be acquired.
    #[error("system information acquisition on {{{0}}} failed")]
    SysInfoFailed(CellIdentity),
}

/// The cell selection outcome: the serving cell the device camped on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedCell {
    /// Identity of the new serving cell
    pub identity: CellIdentity,
    /// RSRP at selection time (dBm)
    pub rsrp_dbm: f32,
}

/// Cell search -> cell select -> system-information acquisition.
#[derive(Debug)]
pub struct CellSelectionProc {
    args: CellSearchArgs,
    state: CellSelectionState,
    target: CellIdentity,
    result: Option<Result<SelectedCell, CellSelectionError>>,
}

impl CellSelectionProc {
    /// Creates a procedure that will search the given carrier.
    pub fn new(args: CellSearchArgs) -> Self {
        Self {
            args,
            state: CellSelectionState::Searching,
            target: CellIdentity::default(),
            result: None,
        }
    }

    /// The current procedure state.
    pub fn state(&self) -> CellSelectionState {
        self.state
    }

    fn fail(&mut self, error: CellSelectionError) -> ProcOutcome {
        self.result = Some(Err(error));
        ProcOutcome::Error
    }

    fn handle_search_result(
        &mut self,
        ctx: &mut RrcContext<'_>,
        result: CellSearchResult,
    ) -> ProcOutcome {
        if !result.found {
            return self.fail(CellSelectionError::NoCellFound);
        }
        let identity = result.identity;
        let Some(mib) = result.mib else {
            return self.fail(CellSelectionError::NoBroadcastInfo(identity));
        };
        if mib.barred {
            return self.fail(CellSelectionError::CellBarred(identity));
        }
        if !mib.supported_config {
            return self.fail(CellSelectionError::UnsupportedConfig(identity));
        }

        info!(
            "cell found {{{identity}}} rsrp={:.1} rsrq={:.1}",
            result.rsrp_dbm, result.rsrq_db
        );

        // Track the cell so it can be promoted to serving on camp success
        ctx.cells.add_measurement_cell(&CellMeasurement {
            earfcn: identity.earfcn,
            pci: identity.pci,
            rsrp_dbm: result.rsrp_dbm,
            rsrq_db: result.rsrq_db,
            cfo_hz: result.cfo_hz,
        });

        let config = PhyConfig {
            identity,
            cfo_hz: result.cfo_hz,
        };
        if !ctx.radio.apply_phy_config(&config) {
            return self.fail(CellSelectionError::PhyConfigRejected(identity));
        }
        if !ctx.radio.start_cell_select(identity) {
            return self.fail(CellSelectionError::SelectStartRejected(identity));
        }

        self.target = identity;
        self.state = CellSelectionState::Selecting;
        ProcOutcome::Yield
    }

    fn handle_select_result(
        &mut self,
        ctx: &mut RrcContext<'_>,
        status: CellSelectStatus,
    ) -> ProcOutcome {
        if status == CellSelectStatus::Failure {
            return self.fail(CellSelectionError::SelectFailed(self.target));
        }
        if ctx.cells.set_serving_cell(self.target, false).is_err() {
            // The tracked entry was pruned between search and select
            return self.fail(CellSelectionError::SelectFailed(self.target));
        }
        info!("camped on {{{}}}, acquiring system information", self.target);
        self.state = CellSelectionState::AcquiringSysInfo;
        ProcOutcome::Yield
    }

    fn handle_sib_decoded(&mut self, ctx: &mut RrcContext<'_>, decoded: bool) -> ProcOutcome {
        if !decoded {
            return self.fail(CellSelectionError::SysInfoFailed(self.target));
        }
        let serving = ctx.cells.serving_cell_mut();
        serving.sys_info_mut().set_sib(SIB1_INDEX);
        let rsrp_dbm = serving.rsrp();
        self.result = Some(Ok(SelectedCell {
            identity: self.target,
            rsrp_dbm,
        }));
        ProcOutcome::Success
    }
}

impl Procedure for CellSelectionProc {
    type Event = CellSelectionEvent;
    type Output = SelectedCell;
    type Failure = CellSelectionError;

    const NAME: &'static str = "cell selection";

    fn init(&mut self, ctx: &mut RrcContext<'_>) -> ProcOutcome {
        if !ctx.radio.start_cell_search(&self.args) {
            return self.fail(CellSelectionError::SearchStartRejected);
        }
        self.state = CellSelectionState::Searching;
        ProcOutcome::Yield
    }

    fn react(&mut self, ctx: &mut RrcContext<'_>, event: CellSelectionEvent) -> ProcOutcome {
        match (self.state, event) {
            (CellSelectionState::Searching, CellSelectionEvent::SearchResult(result)) => {
                self.handle_search_result(ctx, result)
            }
            (CellSelectionState::Selecting, CellSelectionEvent::SelectResult(status)) => {
                self.handle_select_result(ctx, status)
            }
            (CellSelectionState::AcquiringSysInfo, CellSelectionEvent::SibDecoded(decoded)) => {
                self.handle_sib_decoded(ctx, decoded)
            }
            (state, event) => {
                debug!("ignoring {event:?} in state {state:?}");
                ProcOutcome::Yield
            }
        }
    }

    fn take_result(&mut self) -> Option<Result<SelectedCell, CellSelectionError>> {
        self.result.take()
    }
}
