//! Setup request (connection establishment) procedure
//!
//! Validates local preconditions, obtains a serving cell through the cell
//! selection sub-procedure, sends the establishment request and guards the
//! wait for the network's answer with T300. The guard elapsing without a
//! connected state is the timeout/rejection path; there is no internal
//! retry.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::interfaces::{
    CellSearchArgs, EstablishmentCause, RrcIndication, UplinkMessage, LCID_SRB0,
};
use crate::proc::cell_selection::{CellSelectionError, SelectedCell};
use crate::proc::{DeferredAction, ProcOutcome, Procedure, RrcContext};

/// Mask for the 39-bit random UE identity carried in the setup request.
const UE_IDENTITY_MASK: u64 = (1 << 39) - 1;

/// States of the setup request procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupRequestState {
    /// Waiting for the cell selection sub-procedure
    CellSelection,
    /// Configuring the serving cell and sending the request
    ConfigServingCell,
    /// Waiting for the T300 guard to resolve
    WaitForTimer,
}

/// Events consumed by the setup request procedure.
#[derive(Debug)]
pub enum SetupRequestEvent {
    /// Completion of the cell selection sub-procedure
    CellSelectionOutcome(Result<SelectedCell, CellSelectionError>),
}

/// Terminal errors of the setup request procedure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupRequestError {
    /// No network has been selected; establishment cannot be attempted.
    #[error("no network selected")]
    NoNetworkSelected,
    /// The UE is not idle; establishment is only valid from idle.
    #[error("connection establishment requires the idle state")]
    NotIdle,
    /// The cell selection sub-procedure failed.
    #[error("cell selection failed: {0}")]
    CellSelectionFailed(#[from] CellSelectionError),
    /// T300 elapsed without the connection being established.
    #[error("establishment guard timer elapsed")]
    EstablishmentTimeout,
}

/// Connection establishment: cell selection, request, guarded wait.
#[derive(Debug)]
pub struct SetupRequestProc {
    cause: EstablishmentCause,
    search_args: CellSearchArgs,
    state: SetupRequestState,
    result: Option<Result<(), SetupRequestError>>,
}

impl SetupRequestProc {
    /// Creates an establishment attempt with the given cause, searching the
    /// given carrier if no cell selection is already in flight.
    pub fn new(cause: EstablishmentCause, search_args: CellSearchArgs) -> Self {
        Self {
            cause,
            search_args,
            state: SetupRequestState::CellSelection,
            result: None,
        }
    }

    /// The current procedure state.
    pub fn state(&self) -> SetupRequestState {
        self.state
    }

    fn fail(&mut self, error: SetupRequestError) -> ProcOutcome {
        self.result = Some(Err(error));
        ProcOutcome::Error
    }
}

impl Procedure for SetupRequestProc {
    type Event = SetupRequestEvent;
    type Output = ();
    type Failure = SetupRequestError;

    const NAME: &'static str = "setup request";

    fn init(&mut self, ctx: &mut RrcContext<'_>) -> ProcOutcome {
        // Local validation, not a protocol error: fail before any radio work
        if !ctx.cfg.plmn.has_value() {
            return self.fail(SetupRequestError::NoNetworkSelected);
        }
        if !ctx.state.state().is_idle() {
            return self.fail(SetupRequestError::NotIdle);
        }

        info!("connection establishment requested, cause {}", self.cause);
        ctx.actions
            .push_back(DeferredAction::StartCellSelection(self.search_args));
        self.state = SetupRequestState::CellSelection;
        ProcOutcome::Yield
    }

    fn step(&mut self, ctx: &mut RrcContext<'_>) -> ProcOutcome {
        match self.state {
            SetupRequestState::WaitForTimer => {
                if ctx.t300.is_running() {
                    return ProcOutcome::Yield;
                }
                if ctx.state.state().is_connected() {
                    self.result = Some(Ok(()));
                    return ProcOutcome::Success;
                }
                self.fail(SetupRequestError::EstablishmentTimeout)
            }
            _ => ProcOutcome::Yield,
        }
    }

    fn react(&mut self, ctx: &mut RrcContext<'_>, event: SetupRequestEvent) -> ProcOutcome {
        let SetupRequestEvent::CellSelectionOutcome(outcome) = event;
        if self.state != SetupRequestState::CellSelection {
            debug!("ignoring cell selection outcome in state {:?}", self.state);
            return ProcOutcome::Yield;
        }
        match outcome {
            Err(e) => self.fail(e.into()),
            Ok(selected) => {
                self.state = SetupRequestState::ConfigServingCell;
                info!(
                    "serving cell {{{}}} ready, sending establishment request",
                    selected.identity
                );

                let ue_identity = rand::thread_rng().gen::<u64>() & UE_IDENTITY_MASK;
                ctx.stack.send_message(
                    LCID_SRB0,
                    UplinkMessage::SetupRequest {
                        ue_identity,
                        cause: self.cause,
                    },
                );

                ctx.t300.set(Duration::from_millis(ctx.cfg.t300_ms));
                ctx.t300.run();
                self.state = SetupRequestState::WaitForTimer;
                ProcOutcome::Yield
            }
        }
    }

    fn take_result(&mut self) -> Option<Result<(), SetupRequestError>> {
        self.result.take()
    }

    fn then(&mut self, ctx: &mut RrcContext<'_>, result: &Result<(), SetupRequestError>) {
        let indication = match result {
            Ok(()) => RrcIndication::ConnectionEstablished,
            Err(_) => RrcIndication::ConnectionFailed,
        };
        ctx.indications.push_back(indication);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellIdentity;
    use crate::engine::test_support::{dummy_context_parts, make_ctx};
    use crate::proc::ProcHandle;
    use crate::state::RrcTransition;
    use std::thread::sleep;

    fn new_proc() -> SetupRequestProc {
        SetupRequestProc::new(EstablishmentCause::MoData, CellSearchArgs { earfcn: 3400 })
    }

    fn selected() -> SelectedCell {
        SelectedCell {
            identity: CellIdentity::new(3400, 4),
            rsrp_dbm: -80.0,
        }
    }

    #[test]
    fn test_fails_fast_without_network() {
        let mut parts = dummy_context_parts();
        parts.cfg.plmn = uecp_common::Plmn::default();
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();

        let result = handle.launch(&mut ctx, new_proc()).unwrap().unwrap();
        assert_eq!(result.unwrap_err(), SetupRequestError::NoNetworkSelected);
        assert!(parts.actions.is_empty());
    }

    #[test]
    fn test_fails_fast_when_not_idle() {
        let mut parts = dummy_context_parts();
        parts.state.transition(RrcTransition::SetupComplete).unwrap();
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();

        let result = handle.launch(&mut ctx, new_proc()).unwrap().unwrap();
        assert_eq!(result.unwrap_err(), SetupRequestError::NotIdle);
        // No cell search was ever requested
        assert!(parts.actions.is_empty());
        assert!(parts.radio_log.lock().unwrap().search_calls.is_empty());
        // The failure is reported exactly once
        assert_eq!(
            parts.indications.pop_front(),
            Some(RrcIndication::ConnectionFailed)
        );
        assert!(parts.indications.is_empty());
    }

    #[test]
    fn test_requests_cell_selection_on_init() {
        let mut parts = dummy_context_parts();
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();

        assert!(handle.launch(&mut ctx, new_proc()).unwrap().is_none());
        assert_eq!(parts.actions.len(), 1);
    }

    #[test]
    fn test_cell_selection_failure_propagates() {
        let mut parts = dummy_context_parts();
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();
        handle.launch(&mut ctx, new_proc()).unwrap();

        let result = handle
            .trigger(
                &mut ctx,
                SetupRequestEvent::CellSelectionOutcome(Err(CellSelectionError::NoCellFound)),
            )
            .unwrap();
        assert_eq!(
            result.unwrap_err(),
            SetupRequestError::CellSelectionFailed(CellSelectionError::NoCellFound)
        );
        assert_eq!(
            parts.indications.pop_front(),
            Some(RrcIndication::ConnectionFailed)
        );
    }

    #[test]
    fn test_sends_request_and_starts_guard() {
        let mut parts = dummy_context_parts();
        parts.cfg.t300_ms = 500;
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();
        handle.launch(&mut ctx, new_proc()).unwrap();

        assert!(handle
            .trigger(
                &mut ctx,
                SetupRequestEvent::CellSelectionOutcome(Ok(selected())),
            )
            .is_none());
        assert!(parts.t300.is_running());

        let log = parts.stack_log.lock().unwrap();
        assert_eq!(log.sent.len(), 1);
        let (lcid, msg) = &log.sent[0];
        assert_eq!(*lcid, LCID_SRB0);
        match msg {
            UplinkMessage::SetupRequest { ue_identity, cause } => {
                assert!(*ue_identity <= UE_IDENTITY_MASK);
                assert_eq!(*cause, EstablishmentCause::MoData);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_yields_while_guard_runs() {
        let mut parts = dummy_context_parts();
        parts.cfg.t300_ms = 500;
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();
        handle.launch(&mut ctx, new_proc()).unwrap();
        handle.trigger(
            &mut ctx,
            SetupRequestEvent::CellSelectionOutcome(Ok(selected())),
        );

        assert!(handle.step(&mut ctx).is_none());
        assert!(handle.is_busy());
    }

    #[test]
    fn test_guard_expiry_without_connection_is_timeout() {
        let mut parts = dummy_context_parts();
        parts.cfg.t300_ms = 20;
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();
        handle.launch(&mut ctx, new_proc()).unwrap();
        handle.trigger(
            &mut ctx,
            SetupRequestEvent::CellSelectionOutcome(Ok(selected())),
        );

        sleep(std::time::Duration::from_millis(30));
        let result = handle.step(&mut ctx).unwrap();
        assert_eq!(result.unwrap_err(), SetupRequestError::EstablishmentTimeout);
        // No retry: still exactly one search action and one sent request
        assert!(parts.actions.len() <= 1);
        assert_eq!(parts.stack_log.lock().unwrap().sent.len(), 1);
        assert_eq!(
            parts.indications.pop_front(),
            Some(RrcIndication::ConnectionFailed)
        );
    }

    #[test]
    fn test_guard_stopped_with_connection_is_success() {
        let mut parts = dummy_context_parts();
        parts.cfg.t300_ms = 500;
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();
        handle.launch(&mut ctx, new_proc()).unwrap();
        handle.trigger(
            &mut ctx,
            SetupRequestEvent::CellSelectionOutcome(Ok(selected())),
        );

        // Connection setup stops the guard and connects the state machine
        ctx.t300.stop();
        ctx.state.transition(RrcTransition::SetupComplete).unwrap();

        let result = handle.step(&mut ctx).unwrap();
        assert!(result.is_ok());
        assert_eq!(
            parts.indications.pop_front(),
            Some(RrcIndication::ConnectionEstablished)
        );
    }
}
