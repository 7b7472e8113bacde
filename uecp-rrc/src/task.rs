//! RRC task shell
//!
//! [`RrcTask`] wraps the synchronous [`UeRrc`] engine in an async task: a
//! message loop feeds lower- and upper-layer events into the engine, an
//! interval tick drives the cooperative cycle (guard timers, staleness
//! sweep), and queued indications are forwarded to the upper layer after
//! every dispatch. The engine itself never blocks and never runs on more
//! than this one task.

use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use uecp_common::config::UeConfig;

use crate::engine::UeRrc;
use crate::interfaces::{RadioInterface, RrcIndication, StackInterface};
use crate::tasks::{RrcMessage, Task, TaskMessage};

/// Cooperative cycle interval in milliseconds.
const RRC_CYCLE_INTERVAL_MS: u64 = 100;

/// Async shell around the control-plane engine.
pub struct RrcTask {
    rrc: UeRrc,
    upper_tx: mpsc::Sender<RrcIndication>,
}

impl RrcTask {
    /// Creates the task with its collaborators and the upper-layer channel.
    pub fn new(
        cfg: UeConfig,
        radio: Box<dyn RadioInterface + Send>,
        stack: Box<dyn StackInterface + Send>,
        upper_tx: mpsc::Sender<RrcIndication>,
    ) -> Self {
        Self {
            rrc: UeRrc::new(cfg, radio, stack),
            upper_tx,
        }
    }

    /// Read access to the wrapped engine.
    pub fn engine(&self) -> &UeRrc {
        &self.rrc
    }

    fn dispatch(&mut self, msg: RrcMessage) {
        match msg {
            RrcMessage::EstablishConnection { cause, payload } => {
                if let Err(e) = self.rrc.connection_request(cause, payload) {
                    warn!("establishment request dropped: {e}");
                }
            }
            RrcMessage::StartCellSelection => self.rrc.start_cell_selection(),
            RrcMessage::MeasurementReport(meas) => {
                if !self.rrc.measurement_report(&meas) {
                    debug!("measurement report rejected");
                }
            }
            RrcMessage::CellSearchResult(result) => self.rrc.cell_search_completed(result),
            RrcMessage::CellSelectResult(status) => self.rrc.cell_select_completed(status),
            RrcMessage::SibDecoded(decoded) => self.rrc.sib_acquired(decoded),
            RrcMessage::ConfigApplied(applied) => self.rrc.config_applied(applied),
            RrcMessage::ConnectionSetup(req) => self.rrc.handle_connection_setup(req),
            RrcMessage::Reconfiguration(req) => self.rrc.handle_reconfiguration(req),
            RrcMessage::MobilityCommand { target } => self.rrc.mobility_command_received(target),
            RrcMessage::LocalRelease => self.rrc.local_connection_release(),
            RrcMessage::RadioLinkFailure => self.rrc.radio_link_failure(),
            RrcMessage::HandoverFailure => self.rrc.handover_failure(),
            RrcMessage::TriggerCycle => self.rrc.tick(),
        }
    }

    async fn flush_indications(&mut self) {
        for indication in self.rrc.take_indications() {
            if self.upper_tx.send(indication).await.is_err() {
                warn!("upper layer channel closed, indication dropped");
                return;
            }
        }
    }
}

#[async_trait::async_trait]
impl Task for RrcTask {
    type Message = RrcMessage;

    async fn run(&mut self, mut rx: mpsc::Receiver<TaskMessage<RrcMessage>>) {
        info!("RRC task started");
        let mut cycle = interval(Duration::from_millis(RRC_CYCLE_INTERVAL_MS));

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(TaskMessage::Message(msg)) => {
                        self.dispatch(msg);
                        self.flush_indications().await;
                    }
                    Some(TaskMessage::Shutdown) | None => break,
                },
                _ = cycle.tick() => {
                    self.rrc.tick();
                    self.flush_indications().await;
                }
            }
        }
        info!("RRC task stopped");
    }
}
