//! Control-plane engine
//!
//! [`UeRrc`] is the single orchestrating object: it owns the cell list, the
//! connection state machine, the failure-report builder, the procedure
//! manager and the collaborator handles. Lower-layer events arrive through
//! its entry points and are dispatched to whichever procedure currently owns
//! that event type; upper-layer notifications are queued and drained by the
//! caller, never delivered re-entrantly.
//!
//! All mutation happens on the caller's thread. The async shell in
//! [`crate::task`] only feeds this engine.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use uecp_common::config::UeConfig;

use crate::cell::{CellIdentity, CellMeasurement};
use crate::cell_list::CellList;
use crate::interfaces::{
    CellSearchArgs, CellSearchResult, CellSelectStatus, ConnectionSetupRequest,
    EstablishmentCause, RadioInterface, ReconfigurationRequest, RrcIndication, StackInterface,
};
use crate::proc::cell_selection::CellSelectionEvent;
use crate::proc::connection_setup::{ConnectionSetupEvent, ConnectionSetupProc};
use crate::proc::reconfiguration::{ReconfigurationEvent, ReconfigurationProc};
use crate::proc::setup_request::SetupRequestProc;
use crate::proc::{DeferredAction, ProcError, ProcManager, RrcContext};
use crate::rlf_report::{FailureKind, RlfReport, RlfReportBuilder};
use crate::state::{RrcState, RrcStateMachine, RrcTransition};
use crate::timer::OneShotTimer;

/// The UE control-plane core.
pub struct UeRrc {
    cfg: UeConfig,
    cells: CellList,
    state: RrcStateMachine,
    /// Connection establishment guard, shared between setup request and
    /// connection setup
    t300: OneShotTimer,
    rlf_report: RlfReportBuilder,
    procs: ProcManager,
    radio: Box<dyn RadioInterface + Send>,
    stack: Box<dyn StackInterface + Send>,
    indications: VecDeque<RrcIndication>,
    actions: VecDeque<DeferredAction>,
    /// Dedicated payload held between the establishment request and the
    /// connection setup answer
    pending_payload: Option<Bytes>,
}

impl UeRrc {
    /// Creates the engine with its collaborators.
    pub fn new(
        cfg: UeConfig,
        radio: Box<dyn RadioInterface + Send>,
        stack: Box<dyn StackInterface + Send>,
    ) -> Self {
        let cells = CellList::new(Duration::from_millis(cfg.neighbour_timeout_ms));
        let t300 = OneShotTimer::new("T300", Duration::from_millis(cfg.t300_ms));
        let rlf_report = RlfReportBuilder::new(Duration::from_millis(cfg.t304_ms));
        Self {
            cfg,
            cells,
            state: RrcStateMachine::new(),
            t300,
            rlf_report,
            procs: ProcManager::new(),
            radio,
            stack,
            indications: VecDeque::new(),
            actions: VecDeque::new(),
            pending_payload: None,
        }
    }

    /// Borrows the per-call context and the procedure manager together.
    fn split_mut(&mut self) -> (RrcContext<'_>, &mut ProcManager) {
        (
            RrcContext {
                cfg: &self.cfg,
                cells: &mut self.cells,
                state: &mut self.state,
                t300: &mut self.t300,
                radio: self.radio.as_mut(),
                stack: self.stack.as_mut(),
                indications: &mut self.indications,
                actions: &mut self.actions,
            },
            &mut self.procs,
        )
    }

    /// Performs deferred launches and re-polls every busy procedure.
    fn run_procedures(&mut self) {
        let (mut ctx, procs) = self.split_mut();
        procs.drain_actions(&mut ctx);
        procs.step_all(&mut ctx);
        procs.drain_actions(&mut ctx);
    }

    // ------------------------------------------------------------------
    // Upper-layer entry points
    // ------------------------------------------------------------------

    /// Requests a connection establishment. The dedicated payload is held
    /// in reserve until the network's setup answer and then carried in the
    /// completion message.
    pub fn connection_request(
        &mut self,
        cause: EstablishmentCause,
        payload: Bytes,
    ) -> Result<(), ProcError> {
        self.pending_payload = Some(payload);
        let args = CellSearchArgs {
            earfcn: self.cfg.earfcn,
        };
        let launched = {
            let (mut ctx, procs) = self.split_mut();
            procs
                .setup_request
                .launch(&mut ctx, SetupRequestProc::new(cause, args))
        };
        if let Err(e) = launched {
            warn!("failed to initiate establishment: {e}");
            self.pending_payload = None;
            return Err(e);
        }
        self.run_procedures();
        Ok(())
    }

    /// Launches (or awaits an already-running) cell selection.
    pub fn start_cell_selection(&mut self) {
        let args = CellSearchArgs {
            earfcn: self.cfg.earfcn,
        };
        self.actions
            .push_back(DeferredAction::StartCellSelection(args));
        self.run_procedures();
    }

    // ------------------------------------------------------------------
    // Lower-layer events
    // ------------------------------------------------------------------

    /// Ingests a measurement report into the cell list.
    pub fn measurement_report(&mut self, meas: &CellMeasurement) -> bool {
        self.cells.add_measurement_cell(meas)
    }

    /// Delivers the result of an asynchronous cell search.
    pub fn cell_search_completed(&mut self, result: CellSearchResult) {
        {
            let (mut ctx, procs) = self.split_mut();
            if !procs.cell_selection.is_busy() {
                warn!("cell search result with no procedure waiting");
            } else if let Some(completed) = procs
                .cell_selection
                .trigger(&mut ctx, CellSelectionEvent::SearchResult(result))
            {
                procs.on_cell_selection_complete(&mut ctx, completed);
            }
        }
        self.run_procedures();
    }

    /// Delivers the result of an asynchronous cell select.
    pub fn cell_select_completed(&mut self, status: CellSelectStatus) {
        {
            let (mut ctx, procs) = self.split_mut();
            if !procs.cell_selection.is_busy() {
                warn!("cell select result with no procedure waiting");
            } else if let Some(completed) = procs
                .cell_selection
                .trigger(&mut ctx, CellSelectionEvent::SelectResult(status))
            {
                procs.on_cell_selection_complete(&mut ctx, completed);
            }
        }
        self.run_procedures();
    }

    /// Delivers the system-information acquisition outcome.
    pub fn sib_acquired(&mut self, decoded: bool) {
        {
            let (mut ctx, procs) = self.split_mut();
            if !procs.cell_selection.is_busy() {
                debug!("system information notification with no procedure waiting");
            } else if let Some(completed) = procs
                .cell_selection
                .trigger(&mut ctx, CellSelectionEvent::SibDecoded(decoded))
            {
                procs.on_cell_selection_complete(&mut ctx, completed);
            }
        }
        self.run_procedures();
    }

    /// Delivers the lower layers' configuration confirmation to whichever
    /// procedure is waiting for it.
    pub fn config_applied(&mut self, applied: bool) {
        {
            let (mut ctx, procs) = self.split_mut();
            if procs.connection_setup.is_busy() {
                let _ = procs
                    .connection_setup
                    .trigger(&mut ctx, ConnectionSetupEvent::ConfigApplied(applied));
            } else if procs.reconfiguration.is_busy() {
                let _ = procs
                    .reconfiguration
                    .trigger(&mut ctx, ReconfigurationEvent::ConfigApplied(applied));
            } else {
                warn!("configuration confirmation with no procedure waiting");
            }
        }
        self.run_procedures();
    }

    // ------------------------------------------------------------------
    // Downlink messages (pre-decoded by the codec collaborator)
    // ------------------------------------------------------------------

    /// Handles a received connection-setup message.
    pub fn handle_connection_setup(&mut self, msg: ConnectionSetupRequest) {
        let payload = self.pending_payload.take().unwrap_or_default();
        let launched = {
            let (mut ctx, procs) = self.split_mut();
            procs
                .connection_setup
                .launch(&mut ctx, ConnectionSetupProc::new(msg, payload))
        };
        if let Err(e) = launched {
            warn!("connection setup dropped: {e}");
        }
        self.run_procedures();
    }

    /// Handles a received connection-reconfiguration message.
    pub fn handle_reconfiguration(&mut self, msg: ReconfigurationRequest) {
        if !self.state.state().is_connected() {
            warn!("reconfiguration received while not connected, ignored");
            return;
        }
        let launched = {
            let (mut ctx, procs) = self.split_mut();
            procs
                .reconfiguration
                .launch(&mut ctx, ReconfigurationProc::new(msg))
        };
        if let Err(e) = launched {
            warn!("reconfiguration dropped: {e}");
        }
        self.run_procedures();
    }

    /// Releases the connection locally (e.g. on upper-layer request).
    pub fn local_connection_release(&mut self) {
        if !self.state.state().is_connected() {
            debug!("local release while not connected, ignored");
            return;
        }
        if let Err(e) = self.state.transition(RrcTransition::Release) {
            warn!("release transition rejected: {e}");
            return;
        }
        info!("connection released locally");
        self.indications
            .push_back(RrcIndication::ConnectionReleased);
    }

    /// Records a mobility command and starts its guard window.
    pub fn mobility_command_received(&mut self, target: CellIdentity) {
        self.rlf_report.received_mobility_command(target);
    }

    /// Handles a detected radio link failure.
    pub fn radio_link_failure(&mut self) {
        self.connection_failure(FailureKind::LinkFailure);
    }

    /// Handles a failed mobility command execution.
    pub fn handover_failure(&mut self) {
        self.connection_failure(FailureKind::HandoverFailure);
    }

    fn connection_failure(&mut self, kind: FailureKind) {
        self.rlf_report.set_failure(&self.cells, kind);
        self.indications
            .push_back(RrcIndication::FailureReportAvailable);
        if self.state.state().is_connected() {
            if let Err(e) = self.state.transition(RrcTransition::RadioLinkFailure) {
                warn!("failure transition rejected: {e}");
            } else {
                info!("connection lost ({kind}), back to idle");
            }
        }
        self.run_procedures();
    }

    // ------------------------------------------------------------------
    // Cooperative driving
    // ------------------------------------------------------------------

    /// One cooperative cycle: sweep stale neighbours and re-poll the active
    /// procedures (guard timers resolve here).
    pub fn tick(&mut self) {
        self.cells.clean_neighbours();
        self.run_procedures();
    }

    /// Drains the queued upper-layer notifications.
    pub fn take_indications(&mut self) -> Vec<RrcIndication> {
        self.indications.drain(..).collect()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// The current connection state.
    pub fn state(&self) -> RrcState {
        self.state.state()
    }

    /// True while connected.
    pub fn is_connected(&self) -> bool {
        self.state.state().is_connected()
    }

    /// Read access to the tracked cells.
    pub fn cells(&self) -> &CellList {
        &self.cells
    }

    /// The captured failure report, if one is pending transmission.
    pub fn failure_report(&self) -> Option<&RlfReport> {
        self.rlf_report.report()
    }

    /// True iff a failure report has been captured and not yet cleared.
    pub fn has_failure_report(&self) -> bool {
        self.rlf_report.has_info()
    }

    /// Discards the captured failure report after it has been read.
    pub fn clear_failure_report(&mut self) {
        self.rlf_report.clear();
    }
}

// ----------------------------------------------------------------------
// Test support: recording collaborators shared by the procedure tests
// ----------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::Bytes;

    use uecp_common::config::UeConfig;
    use uecp_common::Plmn;

    use crate::cell::CellIdentity;
    use crate::cell_list::CellList;
    use crate::interfaces::{
        CellGroupConfig, CellSearchArgs, CellSearchResult, ConnectionSetupRequest, MibSummary,
        PhyConfig, RadioBearerConfig, RadioInterface, StackInterface, UplinkMessage,
    };
    use crate::proc::{DeferredAction, RrcContext};
    use crate::state::RrcStateMachine;
    use crate::timer::OneShotTimer;

    use super::UeRrc;

    /// Call log of the recording radio collaborator.
    #[derive(Debug)]
    pub(crate) struct RadioLog {
        pub search_calls: Vec<CellSearchArgs>,
        pub select_calls: Vec<CellIdentity>,
        pub phy_configs: Vec<PhyConfig>,
        pub accept_search: bool,
        pub accept_select: bool,
        pub accept_phy_config: bool,
    }

    impl Default for RadioLog {
        fn default() -> Self {
            Self {
                search_calls: Vec::new(),
                select_calls: Vec::new(),
                phy_configs: Vec::new(),
                accept_search: true,
                accept_select: true,
                accept_phy_config: true,
            }
        }
    }

    /// Call log of the recording stack collaborator.
    #[derive(Debug)]
    pub(crate) struct StackLog {
        pub cell_group_calls: Vec<CellGroupConfig>,
        pub radio_bearer_calls: Vec<RadioBearerConfig>,
        pub security_calls: Vec<u32>,
        pub sent: Vec<(u32, UplinkMessage)>,
        pub accept_cell_group: bool,
        pub accept_radio_bearer: bool,
        pub accept_security: bool,
    }

    impl Default for StackLog {
        fn default() -> Self {
            Self {
                cell_group_calls: Vec::new(),
                radio_bearer_calls: Vec::new(),
                security_calls: Vec::new(),
                sent: Vec::new(),
                accept_cell_group: true,
                accept_radio_bearer: true,
                accept_security: true,
            }
        }
    }

    pub(crate) struct RecordingRadio {
        pub log: Arc<Mutex<RadioLog>>,
    }

    impl RadioInterface for RecordingRadio {
        fn start_cell_search(&mut self, args: &CellSearchArgs) -> bool {
            let mut log = self.log.lock().unwrap();
            log.search_calls.push(*args);
            log.accept_search
        }

        fn start_cell_select(&mut self, identity: CellIdentity) -> bool {
            let mut log = self.log.lock().unwrap();
            log.select_calls.push(identity);
            log.accept_select
        }

        fn apply_phy_config(&mut self, config: &PhyConfig) -> bool {
            let mut log = self.log.lock().unwrap();
            log.phy_configs.push(*config);
            log.accept_phy_config
        }
    }

    pub(crate) struct RecordingStack {
        pub log: Arc<Mutex<StackLog>>,
    }

    impl StackInterface for RecordingStack {
        fn apply_cell_group_config(&mut self, config: &CellGroupConfig) -> bool {
            let mut log = self.log.lock().unwrap();
            log.cell_group_calls.push(config.clone());
            log.accept_cell_group
        }

        fn apply_radio_bearer_config(&mut self, config: &RadioBearerConfig) -> bool {
            let mut log = self.log.lock().unwrap();
            log.radio_bearer_calls.push(config.clone());
            log.accept_radio_bearer
        }

        fn refresh_security_keys(&mut self, sk_counter: u32) -> bool {
            let mut log = self.log.lock().unwrap();
            log.security_calls.push(sk_counter);
            log.accept_security
        }

        fn send_message(&mut self, lcid: u32, msg: UplinkMessage) {
            self.log.lock().unwrap().sent.push((lcid, msg));
        }
    }

    /// Everything an [`RrcContext`] borrows, owned in one place for tests.
    pub(crate) struct ContextParts {
        pub cfg: UeConfig,
        pub cells: CellList,
        pub state: RrcStateMachine,
        pub t300: OneShotTimer,
        pub radio: RecordingRadio,
        pub stack: RecordingStack,
        pub radio_log: Arc<Mutex<RadioLog>>,
        pub stack_log: Arc<Mutex<StackLog>>,
        pub indications: VecDeque<crate::interfaces::RrcIndication>,
        pub actions: VecDeque<DeferredAction>,
    }

    pub(crate) fn test_config() -> UeConfig {
        UeConfig {
            plmn: Plmn::new(999, 70, false),
            ..UeConfig::default()
        }
    }

    pub(crate) fn dummy_context_parts() -> ContextParts {
        let cfg = test_config();
        let radio_log = Arc::new(Mutex::new(RadioLog::default()));
        let stack_log = Arc::new(Mutex::new(StackLog::default()));
        ContextParts {
            cells: CellList::new(Duration::from_millis(cfg.neighbour_timeout_ms)),
            state: RrcStateMachine::new(),
            t300: OneShotTimer::new("T300", Duration::from_millis(cfg.t300_ms)),
            radio: RecordingRadio {
                log: radio_log.clone(),
            },
            stack: RecordingStack {
                log: stack_log.clone(),
            },
            radio_log,
            stack_log,
            indications: VecDeque::new(),
            actions: VecDeque::new(),
            cfg,
        }
    }

    pub(crate) fn make_ctx(parts: &mut ContextParts) -> RrcContext<'_> {
        RrcContext {
            cfg: &parts.cfg,
            cells: &mut parts.cells,
            state: &mut parts.state,
            t300: &mut parts.t300,
            radio: &mut parts.radio,
            stack: &mut parts.stack,
            indications: &mut parts.indications,
            actions: &mut parts.actions,
        }
    }

    /// A successful search result for the given cell.
    pub(crate) fn found_result(earfcn: u32, pci: u16, rsrp_dbm: f32) -> CellSearchResult {
        CellSearchResult {
            found: true,
            identity: CellIdentity::new(earfcn, pci),
            rsrp_dbm,
            rsrq_db: -10.0,
            cfo_hz: 0.0,
            mib: Some(MibSummary {
                barred: false,
                supported_config: true,
            }),
        }
    }

    /// A minimal downlink connection-setup message.
    pub(crate) fn setup_request_msg(transaction_id: u8) -> ConnectionSetupRequest {
        ConnectionSetupRequest {
            transaction_id,
            cell_group: CellGroupConfig {
                with_sync: false,
                config: Bytes::from_static(b"cg"),
            },
            radio_bearer: RadioBearerConfig {
                config: Bytes::from_static(b"rb"),
            },
        }
    }

    /// An engine wired to recording collaborators.
    pub(crate) fn new_engine(cfg: UeConfig) -> (UeRrc, Arc<Mutex<RadioLog>>, Arc<Mutex<StackLog>>) {
        let radio_log = Arc::new(Mutex::new(RadioLog::default()));
        let stack_log = Arc::new(Mutex::new(StackLog::default()));
        let engine = UeRrc::new(
            cfg,
            Box::new(RecordingRadio {
                log: radio_log.clone(),
            }),
            Box::new(RecordingStack {
                log: stack_log.clone(),
            }),
        );
        (engine, radio_log, stack_log)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::interfaces::{CellGroupConfig, UplinkMessage, LCID_SRB0, LCID_SRB1};
    use crate::state::RrcTransition;
    use std::thread::sleep;

    /// Drives an engine through establishment up to the guarded wait.
    fn establish_to_wait(engine: &mut UeRrc) {
        engine
            .connection_request(EstablishmentCause::MoData, Bytes::from_static(b"nas"))
            .unwrap();
        engine.cell_search_completed(found_result(3400, 4, -80.0));
        engine.cell_select_completed(CellSelectStatus::Success);
        engine.sib_acquired(true);
    }

    #[test]
    fn test_connection_request_when_not_idle_fails_immediately() {
        let (mut engine, radio_log, _) = new_engine(test_config());
        engine.state.transition(RrcTransition::SetupComplete).unwrap();

        engine
            .connection_request(EstablishmentCause::MoData, Bytes::new())
            .unwrap();

        let indications = engine.take_indications();
        assert_eq!(indications, vec![RrcIndication::ConnectionFailed]);
        // No cell search was ever initiated
        assert!(radio_log.lock().unwrap().search_calls.is_empty());
    }

    #[test]
    fn test_connection_request_rejected_while_busy() {
        let (mut engine, _, _) = new_engine(test_config());
        engine
            .connection_request(EstablishmentCause::MoData, Bytes::new())
            .unwrap();
        let err = engine
            .connection_request(EstablishmentCause::MoData, Bytes::new())
            .unwrap_err();
        assert_eq!(err, ProcError::Busy("setup request"));
    }

    #[test]
    fn test_establishment_happy_path() {
        let (mut engine, radio_log, stack_log) = new_engine(test_config());

        engine
            .connection_request(EstablishmentCause::MoSignalling, Bytes::from_static(b"nas"))
            .unwrap();
        // The setup request deferred a cell selection launch
        assert_eq!(radio_log.lock().unwrap().search_calls.len(), 1);

        engine.cell_search_completed(found_result(3400, 4, -80.0));
        {
            let radio = radio_log.lock().unwrap();
            assert_eq!(radio.phy_configs.len(), 1);
            assert_eq!(radio.select_calls, vec![CellIdentity::new(3400, 4)]);
        }

        engine.cell_select_completed(CellSelectStatus::Success);
        assert_eq!(
            engine.cells().serving_cell().identity(),
            CellIdentity::new(3400, 4)
        );

        engine.sib_acquired(true);
        // The establishment request went out on SRB0 and the guard runs
        {
            let stack = stack_log.lock().unwrap();
            assert_eq!(stack.sent.len(), 1);
            assert_eq!(stack.sent[0].0, LCID_SRB0);
        }
        assert!(engine.t300.is_running());

        engine.handle_connection_setup(setup_request_msg(1));
        assert!(!engine.t300.is_running());

        engine.config_applied(true);
        assert!(engine.is_connected());
        {
            let stack = stack_log.lock().unwrap();
            assert_eq!(stack.sent.len(), 2);
            let (lcid, msg) = &stack.sent[1];
            assert_eq!(*lcid, LCID_SRB1);
            match msg {
                UplinkMessage::SetupComplete { payload, .. } => {
                    assert_eq!(payload.as_ref(), b"nas");
                }
                other => panic!("unexpected message {other:?}"),
            }
        }

        // The establishment procedure resolves on the next poll and reports
        // exactly once
        engine.tick();
        let indications = engine.take_indications();
        assert_eq!(indications, vec![RrcIndication::ConnectionEstablished]);
        engine.tick();
        assert!(engine.take_indications().is_empty());
    }

    #[test]
    fn test_guard_timeout_fails_without_retry() {
        let cfg = UeConfig {
            t300_ms: 20,
            ..test_config()
        };
        let (mut engine, radio_log, stack_log) = new_engine(cfg);
        establish_to_wait(&mut engine);

        sleep(Duration::from_millis(30));
        engine.tick();

        let indications = engine.take_indications();
        assert_eq!(indications, vec![RrcIndication::ConnectionFailed]);
        assert!(engine.state().is_idle());
        // No second search, no second request: no internal retry
        assert_eq!(radio_log.lock().unwrap().search_calls.len(), 1);
        assert_eq!(stack_log.lock().unwrap().sent.len(), 1);
    }

    #[test]
    fn test_search_not_found_fails_establishment() {
        let (mut engine, radio_log, _) = new_engine(test_config());
        engine
            .connection_request(EstablishmentCause::MoData, Bytes::new())
            .unwrap();

        engine.cell_search_completed(CellSearchResult::not_found());

        let indications = engine.take_indications();
        assert_eq!(indications, vec![RrcIndication::ConnectionFailed]);
        assert!(radio_log.lock().unwrap().select_calls.is_empty());
    }

    #[test]
    fn test_standalone_cell_selection() {
        let (mut engine, radio_log, _) = new_engine(test_config());
        engine.start_cell_selection();
        assert_eq!(radio_log.lock().unwrap().search_calls.len(), 1);

        engine.cell_search_completed(found_result(3400, 7, -70.0));
        engine.cell_select_completed(CellSelectStatus::Success);
        engine.sib_acquired(true);

        assert_eq!(
            engine.cells().serving_cell().identity(),
            CellIdentity::new(3400, 7)
        );
        // Completion with no parent waiting produces no indication
        assert!(engine.take_indications().is_empty());
    }

    #[test]
    fn test_second_establishment_awaits_running_selection() {
        let (mut engine, radio_log, _) = new_engine(test_config());
        engine.start_cell_selection();
        engine
            .connection_request(EstablishmentCause::MoData, Bytes::new())
            .unwrap();

        // The already-running selection is awaited, not relaunched
        assert_eq!(radio_log.lock().unwrap().search_calls.len(), 1);

        engine.cell_search_completed(found_result(3400, 4, -80.0));
        engine.cell_select_completed(CellSelectStatus::Success);
        engine.sib_acquired(true);
        // The waiting setup request consumed the completion and sent its
        // establishment request
        assert!(engine.t300.is_running());
    }

    #[test]
    fn test_config_applied_routed_to_reconfiguration() {
        let (mut engine, _, stack_log) = new_engine(test_config());
        engine.state.transition(RrcTransition::SetupComplete).unwrap();

        engine.handle_reconfiguration(ReconfigurationRequest {
            transaction_id: 3,
            master_cell_group: Some(CellGroupConfig {
                with_sync: true,
                config: Bytes::from_static(b"mcg"),
            }),
            ..Default::default()
        });
        assert!(stack_log.lock().unwrap().sent.is_empty());

        engine.config_applied(true);
        let stack = stack_log.lock().unwrap();
        assert!(matches!(
            stack.sent[0].1,
            UplinkMessage::ReconfigurationComplete { transaction_id: 3 }
        ));
        drop(stack);
        assert_eq!(
            engine.take_indications(),
            vec![RrcIndication::ReconfigurationApplied]
        );
    }

    #[test]
    fn test_reconfiguration_ignored_when_idle() {
        let (mut engine, _, stack_log) = new_engine(test_config());
        engine.handle_reconfiguration(ReconfigurationRequest::default());
        assert!(stack_log.lock().unwrap().sent.is_empty());
        assert!(engine.take_indications().is_empty());
    }

    #[test]
    fn test_radio_link_failure_captures_report() {
        let (mut engine, _, _) = new_engine(test_config());
        engine.measurement_report(&CellMeasurement {
            earfcn: 3400,
            pci: 1,
            rsrp_dbm: -20.0,
            rsrq_db: -10.0,
            cfo_hz: 0.0,
        });
        engine.measurement_report(&CellMeasurement {
            earfcn: 3400,
            pci: 4,
            rsrp_dbm: -20.0,
            rsrq_db: -10.0,
            cfo_hz: 0.0,
        });
        engine.measurement_report(&CellMeasurement {
            earfcn: 3400,
            pci: 6,
            rsrp_dbm: -20.0,
            rsrq_db: -10.0,
            cfo_hz: 0.0,
        });
        engine
            .cells
            .set_serving_cell(CellIdentity::new(3400, 4), false)
            .unwrap();
        engine.state.transition(RrcTransition::SetupComplete).unwrap();

        engine.radio_link_failure();

        assert!(engine.state().is_idle());
        assert!(engine.has_failure_report());
        let report = engine.failure_report().unwrap();
        assert_eq!(report.failed_cell, CellIdentity::new(3400, 4));
        assert_eq!(report.neighbour_groups.len(), 1);
        let pcis: Vec<u16> = report.neighbour_groups[0]
            .cells
            .iter()
            .map(|c| c.pci)
            .collect();
        assert!(pcis.contains(&1) && pcis.contains(&6));
        assert!(engine
            .take_indications()
            .contains(&RrcIndication::FailureReportAvailable));

        engine.clear_failure_report();
        assert!(!engine.has_failure_report());
    }

    #[test]
    fn test_local_release() {
        let (mut engine, _, _) = new_engine(test_config());

        // A release while idle is a no-op
        engine.local_connection_release();
        assert!(engine.take_indications().is_empty());

        engine.state.transition(RrcTransition::SetupComplete).unwrap();
        engine.local_connection_release();
        assert!(engine.state().is_idle());
        assert_eq!(
            engine.take_indications(),
            vec![RrcIndication::ConnectionReleased]
        );
    }

    #[test]
    fn test_tick_prunes_stale_neighbours() {
        let cfg = UeConfig {
            neighbour_timeout_ms: 30,
            ..test_config()
        };
        let (mut engine, _, _) = new_engine(cfg);
        engine.measurement_report(&CellMeasurement {
            earfcn: 3400,
            pci: 1,
            rsrp_dbm: -80.0,
            rsrq_db: -10.0,
            cfo_hz: 0.0,
        });
        assert_eq!(engine.cells().nof_neighbours(), 1);

        engine.tick();
        assert_eq!(engine.cells().nof_neighbours(), 1);

        sleep(Duration::from_millis(40));
        engine.tick();
        assert_eq!(engine.cells().nof_neighbours(), 0);
    }

    #[test]
    fn test_unexpected_events_are_dropped() {
        let (mut engine, _, _) = new_engine(test_config());
        // None of these may panic or change state
        engine.cell_search_completed(found_result(3400, 1, -80.0));
        engine.cell_select_completed(CellSelectStatus::Success);
        engine.sib_acquired(true);
        engine.config_applied(true);
        assert!(engine.state().is_idle());
        assert!(engine.take_indications().is_empty());
    }
}
