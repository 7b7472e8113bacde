//! Task framework
//!
//! The control-plane core runs inside one async task fed by typed message
//! channels. This module provides the message envelope, the task handle and
//! the task trait, plus the message set of the RRC task itself.

use tokio::sync::mpsc;

use bytes::Bytes;

use crate::cell::{CellIdentity, CellMeasurement};
use crate::interfaces::{
    CellSearchResult, CellSelectStatus, ConnectionSetupRequest, EstablishmentCause,
    ReconfigurationRequest,
};

/// Default shutdown timeout in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Task message envelope wrapping typed messages with control signals.
#[derive(Debug)]
pub enum TaskMessage<T> {
    /// Regular message payload
    Message(T),
    /// Shutdown signal - task should terminate gracefully
    Shutdown,
}

impl<T> TaskMessage<T> {
    /// Creates a new message envelope containing the given payload.
    pub fn message(msg: T) -> Self {
        TaskMessage::Message(msg)
    }

    /// Creates a shutdown signal.
    pub fn shutdown() -> Self {
        TaskMessage::Shutdown
    }

    /// Returns true if this is a shutdown signal.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, TaskMessage::Shutdown)
    }

    /// Returns the message payload if present, or None for shutdown.
    pub fn into_message(self) -> Option<T> {
        match self {
            TaskMessage::Message(msg) => Some(msg),
            TaskMessage::Shutdown => None,
        }
    }
}

/// Handle for sending messages to a task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    tx: mpsc::Sender<TaskMessage<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> TaskHandle<T> {
    /// Creates a new task handle from a sender.
    pub fn new(tx: mpsc::Sender<TaskMessage<T>>) -> Self {
        Self { tx }
    }

    /// Sends a message to the task.
    ///
    /// Returns an error if the task has been dropped.
    pub async fn send(&self, msg: T) -> Result<(), mpsc::error::SendError<TaskMessage<T>>> {
        self.tx.send(TaskMessage::Message(msg)).await
    }

    /// Sends a message to the task without waiting.
    pub fn try_send(&self, msg: T) -> Result<(), mpsc::error::TrySendError<TaskMessage<T>>> {
        self.tx.try_send(TaskMessage::Message(msg))
    }

    /// Sends a shutdown signal to the task.
    pub async fn shutdown(&self) -> Result<(), mpsc::error::SendError<TaskMessage<T>>> {
        self.tx.send(TaskMessage::Shutdown).await
    }

    /// Returns true if the task channel is closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Base trait for message-driven tasks.
#[async_trait::async_trait]
pub trait Task: Send + 'static {
    /// The message type this task processes.
    type Message: Send;

    /// Runs the task's main loop, processing messages until shutdown.
    async fn run(&mut self, rx: mpsc::Receiver<TaskMessage<Self::Message>>);
}

/// Messages consumed by the RRC task.
#[derive(Debug)]
pub enum RrcMessage {
    /// Connection establishment request (from the upper layer)
    EstablishConnection {
        /// Establishment cause
        cause: EstablishmentCause,
        /// Dedicated payload carried in the completion message
        payload: Bytes,
    },
    /// Launch cell selection without an establishment (from the upper layer)
    StartCellSelection,
    /// Measurement report (from the lower layers)
    MeasurementReport(CellMeasurement),
    /// Cell search finished (from the lower layers)
    CellSearchResult(CellSearchResult),
    /// Cell select finished (from the lower layers)
    CellSelectResult(CellSelectStatus),
    /// System-information acquisition outcome (from the lower layers)
    SibDecoded(bool),
    /// Configuration confirmation (from the lower layers)
    ConfigApplied(bool),
    /// Downlink connection-setup message (pre-decoded)
    ConnectionSetup(ConnectionSetupRequest),
    /// Downlink reconfiguration message (pre-decoded)
    Reconfiguration(ReconfigurationRequest),
    /// Mobility command observed (from the lower layers)
    MobilityCommand {
        /// Cell the command points at
        target: CellIdentity,
    },
    /// Release the connection locally (from the upper layer)
    LocalRelease,
    /// Radio link failure detected (from the lower layers)
    RadioLinkFailure,
    /// Mobility command execution failed (from the lower layers)
    HandoverFailure,
    /// Cooperative cycle trigger (internal)
    TriggerCycle,
}
