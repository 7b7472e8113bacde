//! Connection setup procedure
//!
//! A short-lived procedure that holds the dedicated upper-layer payload in
//! reserve while the radio-bearer and cell-group configuration is applied,
//! and defers the completion message until the lower layers confirm the
//! configuration took effect.

use bytes::Bytes;
use thiserror::Error;
use tracing::info;

use crate::interfaces::{ConnectionSetupRequest, UplinkMessage, LCID_SRB1};
use crate::proc::{ProcOutcome, Procedure, RrcContext};
use crate::state::RrcTransition;

/// Events consumed by connection setup.
#[derive(Debug)]
pub enum ConnectionSetupEvent {
    /// Lower-layer confirmation that the configuration was applied
    ConfigApplied(bool),
}

/// Terminal errors of connection setup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionSetupError {
    /// The cell-group configuration was rejected.
    #[error("cell-group configuration rejected")]
    CellGroupConfigRejected,
    /// The radio-bearer configuration was rejected.
    #[error("radio-bearer configuration rejected")]
    RadioBearerConfigRejected,
    /// The lower layers reported the configuration was not applied.
    #[error("configuration was not applied")]
    ConfigNotApplied,
}

/// Applies the setup configuration and sends the completion message.
#[derive(Debug)]
pub struct ConnectionSetupProc {
    request: ConnectionSetupRequest,
    /// Dedicated payload carried in the completion message
    payload: Bytes,
    result: Option<Result<(), ConnectionSetupError>>,
}

impl ConnectionSetupProc {
    /// Creates the procedure for a received setup message, holding the
    /// dedicated payload until the completion message can carry it.
    pub fn new(request: ConnectionSetupRequest, payload: Bytes) -> Self {
        Self {
            request,
            payload,
            result: None,
        }
    }

    fn fail(&mut self, error: ConnectionSetupError) -> ProcOutcome {
        self.result = Some(Err(error));
        ProcOutcome::Error
    }
}

impl Procedure for ConnectionSetupProc {
    type Event = ConnectionSetupEvent;
    type Output = ();
    type Failure = ConnectionSetupError;

    const NAME: &'static str = "connection setup";

    fn init(&mut self, ctx: &mut RrcContext<'_>) -> ProcOutcome {
        // The network answered; the establishment guard has served its purpose
        ctx.t300.stop();

        if !ctx.stack.apply_cell_group_config(&self.request.cell_group) {
            return self.fail(ConnectionSetupError::CellGroupConfigRejected);
        }
        if !ctx.stack.apply_radio_bearer_config(&self.request.radio_bearer) {
            return self.fail(ConnectionSetupError::RadioBearerConfigRejected);
        }
        ProcOutcome::Yield
    }

    fn react(&mut self, ctx: &mut RrcContext<'_>, event: ConnectionSetupEvent) -> ProcOutcome {
        let ConnectionSetupEvent::ConfigApplied(applied) = event;
        if !applied {
            return self.fail(ConnectionSetupError::ConfigNotApplied);
        }

        ctx.stack.send_message(
            LCID_SRB1,
            UplinkMessage::SetupComplete {
                transaction_id: self.request.transaction_id,
                payload: self.payload.clone(),
            },
        );
        if let Err(e) = ctx.state.transition(RrcTransition::SetupComplete) {
            // Already connected is unreachable through normal dispatch
            tracing::warn!("setup completion in unexpected state: {e}");
        }
        info!("connection setup complete, tid={}", self.request.transaction_id);
        self.result = Some(Ok(()));
        ProcOutcome::Success
    }

    fn take_result(&mut self) -> Option<Result<(), ConnectionSetupError>> {
        self.result.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{dummy_context_parts, make_ctx, setup_request_msg};
    use crate::proc::ProcHandle;

    #[test]
    fn test_init_stops_guard_and_applies_configs() {
        let mut parts = dummy_context_parts();
        parts.t300.run();
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();

        let launched = handle
            .launch(
                &mut ctx,
                ConnectionSetupProc::new(setup_request_msg(1), Bytes::from_static(b"nas")),
            )
            .unwrap();
        assert!(launched.is_none());
        assert!(!parts.t300.is_running());

        let log = parts.stack_log.lock().unwrap();
        assert_eq!(log.cell_group_calls.len(), 1);
        assert_eq!(log.radio_bearer_calls.len(), 1);
    }

    #[test]
    fn test_cell_group_rejection_is_terminal() {
        let mut parts = dummy_context_parts();
        parts.stack_log.lock().unwrap().accept_cell_group = false;
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();

        let result = handle
            .launch(
                &mut ctx,
                ConnectionSetupProc::new(setup_request_msg(0), Bytes::new()),
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            result.unwrap_err(),
            ConnectionSetupError::CellGroupConfigRejected
        );
        // No completion message was ever sent
        assert!(parts.stack_log.lock().unwrap().sent.is_empty());
    }

    #[test]
    fn test_radio_bearer_rejection_is_terminal() {
        let mut parts = dummy_context_parts();
        parts.stack_log.lock().unwrap().accept_radio_bearer = false;
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();

        let result = handle
            .launch(
                &mut ctx,
                ConnectionSetupProc::new(setup_request_msg(0), Bytes::new()),
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            result.unwrap_err(),
            ConnectionSetupError::RadioBearerConfigRejected
        );
    }

    #[test]
    fn test_config_applied_sends_completion_with_payload() {
        let mut parts = dummy_context_parts();
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();
        handle
            .launch(
                &mut ctx,
                ConnectionSetupProc::new(setup_request_msg(2), Bytes::from_static(b"nas-pdu")),
            )
            .unwrap();

        let result = handle
            .trigger(&mut ctx, ConnectionSetupEvent::ConfigApplied(true))
            .unwrap();
        assert!(result.is_ok());
        assert!(parts.state.state().is_connected());

        let log = parts.stack_log.lock().unwrap();
        let (lcid, msg) = &log.sent[0];
        assert_eq!(*lcid, LCID_SRB1);
        match msg {
            UplinkMessage::SetupComplete {
                transaction_id,
                payload,
            } => {
                assert_eq!(*transaction_id, 2);
                assert_eq!(payload.as_ref(), b"nas-pdu");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_config_not_applied_is_terminal() {
        let mut parts = dummy_context_parts();
        let mut ctx = make_ctx(&mut parts);
        let mut handle = ProcHandle::new();
        handle
            .launch(
                &mut ctx,
                ConnectionSetupProc::new(setup_request_msg(0), Bytes::new()),
            )
            .unwrap();

        let result = handle
            .trigger(&mut ctx, ConnectionSetupEvent::ConfigApplied(false))
            .unwrap();
        assert_eq!(result.unwrap_err(), ConnectionSetupError::ConfigNotApplied);
        assert!(parts.state.state().is_idle());
        assert!(parts.stack_log.lock().unwrap().sent.is_empty());
    }
}
