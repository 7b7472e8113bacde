//! Connection reconfiguration procedure
//!
//! Applies the optional parts of a reconfiguration message in order:
//! secondary cell-group configuration, security-key refresh, master
//! cell-group configuration, radio-bearer configuration. Piggy-backed
//! upper-layer payloads are forwarded one-by-one. When no applied change
//! requires lower-layer resynchronisation the completion message is sent
//! immediately; otherwise completion waits for the applied confirmation.

use thiserror::Error;
use tracing::{debug, info};

use crate::interfaces::{ReconfigurationRequest, RrcIndication, UplinkMessage, LCID_SRB1};
use crate::proc::{ProcOutcome, Procedure, RrcContext};

/// Events consumed by reconfiguration.
#[derive(Debug)]
pub enum ReconfigurationEvent {
    /// Lower-layer confirmation that the configuration was applied
    ConfigApplied(bool),
}

/// Terminal errors of reconfiguration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconfigurationError {
    /// The secondary cell-group configuration was rejected.
    #[error("secondary cell-group configuration rejected")]
    SecondaryCellGroupRejected,
    /// The security-key refresh failed.
    #[error("security key refresh rejected")]
    SecurityRefreshRejected,
    /// The master cell-group configuration was rejected.
    #[error("master cell-group configuration rejected")]
    MasterCellGroupRejected,
    /// The radio-bearer configuration was rejected.
    #[error("radio-bearer configuration rejected")]
    RadioBearerConfigRejected,
    /// The lower layers reported the configuration was not applied.
    #[error("configuration was not applied")]
    ConfigNotApplied,
}

/// Applies a reconfiguration message and acknowledges it.
#[derive(Debug)]
pub struct ReconfigurationProc {
    request: ReconfigurationRequest,
    awaiting_confirmation: bool,
    result: Option<Result<(), ReconfigurationError>>,
}

impl ReconfigurationProc {
    /// Creates the procedure for a received reconfiguration message.
    pub fn new(request: ReconfigurationRequest) -> Self {
        Self {
            request,
            awaiting_confirmation: false,
            result: None,
        }
    }

    fn fail(&mut self, error: ReconfigurationError) -> ProcOutcome {
        self.result = Some(Err(error));
        ProcOutcome::Error
    }

    fn send_complete(&self, ctx: &mut RrcContext<'_>) {
        ctx.stack.send_message(
            LCID_SRB1,
            UplinkMessage::ReconfigurationComplete {
                transaction_id: self.request.transaction_id,
            },
        );
    }
}

impl Procedure for ReconfigurationProc {
    type Event = ReconfigurationEvent;
    type Output = ();
    type Failure = ReconfigurationError;

    const NAME: &'static str = "reconfiguration";

    fn init(&mut self, ctx: &mut RrcContext<'_>) -> ProcOutcome {
        let mut needs_sync = false;

        if let Some(scg) = &self.request.secondary_cell_group {
            if !ctx.stack.apply_cell_group_config(scg) {
                return self.fail(ReconfigurationError::SecondaryCellGroupRejected);
            }
            needs_sync |= scg.with_sync;
        }
        if let Some(sk_counter) = self.request.sk_counter {
            if !ctx.stack.refresh_security_keys(sk_counter) {
                return self.fail(ReconfigurationError::SecurityRefreshRejected);
            }
        }
        if let Some(mcg) = &self.request.master_cell_group {
            if !ctx.stack.apply_cell_group_config(mcg) {
                return self.fail(ReconfigurationError::MasterCellGroupRejected);
            }
            needs_sync |= mcg.with_sync;
        }
        if let Some(rb) = &self.request.radio_bearer {
            if !ctx.stack.apply_radio_bearer_config(rb) {
                return self.fail(ReconfigurationError::RadioBearerConfigRejected);
            }
        }

        // Forward piggy-backed upper-layer payloads one-by-one
        for payload in self.request.payloads.drain(..) {
            ctx.indications
                .push_back(RrcIndication::UpperLayerPayload(payload));
        }

        if needs_sync {
            debug!("reconfiguration requires resynchronisation, deferring completion");
            self.awaiting_confirmation = true;
            return ProcOutcome::Yield;
        }

        self.send_complete(ctx);
        info!(
            "reconfiguration applied, tid={}",
            self.request.transaction_id
        );
        self.result = Some(Ok(()));
        ProcOutcome::Success
    }

    fn react(&mut self, ctx: &mut RrcContext<'_>, event: ReconfigurationEvent) -> ProcOutcome {
        let ReconfigurationEvent::ConfigApplied(applied) = event;
        if !self.awaiting_confirmation {
            debug!("ignoring configuration confirmation, none expected");
            return ProcOutcome::Yield;
        }
        if !applied {
            return self.fail(ReconfigurationError::ConfigNotApplied);
        }
        self.send_complete(ctx);
        info!(
            "reconfiguration applied after resync, tid={}",
            self.request.transaction_id
        );
        self.result = Some(Ok(()));
        ProcOutcome::Success
    }

    fn take_result(&mut self) -> Option<Result<(), ReconfigurationError>> {
        self.result.take()
    }

    fn then(&mut self, ctx: &mut RrcContext<'_>, result: &Result<(), ReconfigurationError>) {
        let indication = match result {
            Ok(()) => RrcIndication::ReconfigurationApplied,
            Err(_) => RrcIndication::ReconfigurationFailed,
        };
        ctx.indications.push_back(indication);
    }
}
