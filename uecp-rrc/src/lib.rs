//! uecp UE control-plane core
//!
//! This crate implements the control-plane core of a UE radio stack:
//!
//! - Ranked, bounded tracking of candidate radio cells (serving + neighbours)
//! - A cooperative, timer-driven procedure framework with nested
//!   sub-procedures and typed success/failure propagation
//! - The four connection procedures: cell selection, setup request,
//!   connection setup and connection reconfiguration
//! - A radio-link-failure report builder that snapshots the cell list at the
//!   moment a connection is lost
//!
//! Wire-format encode/decode, physical-layer algorithms and key derivation
//! are external collaborators reached through the traits in [`interfaces`].
//! All control-plane mutation happens on one logical thread; the async
//! [`task::RrcTask`] shell only feeds events into the synchronous
//! [`engine::UeRrc`] core.

pub mod cell;
pub mod cell_list;
pub mod engine;
pub mod interfaces;
pub mod proc;
pub mod rlf_report;
pub mod state;
pub mod task;
pub mod tasks;
pub mod timer;

// Re-export commonly used types
pub use cell::{Cell, CellIdentity, CellMeasurement, SysInfoState, MAX_SIBS, PCI_MAX};
pub use cell_list::{CellList, CellListError, MAX_NEIGHBOURS};
pub use engine::UeRrc;
pub use interfaces::{
    CellGroupConfig, CellSearchArgs, CellSearchResult, CellSelectStatus, ConnectionSetupRequest,
    EstablishmentCause, MibSummary, PhyConfig, RadioBearerConfig, RadioInterface,
    ReconfigurationRequest, RrcIndication, StackInterface, UplinkMessage, LCID_SRB0, LCID_SRB1,
};
pub use proc::{ProcError, ProcOutcome, Procedure};
pub use rlf_report::{FailureKind, NeighbourGroup, RlfReport, RlfReportBuilder};
pub use state::{RrcState, RrcStateError, RrcStateMachine, RrcTransition};
pub use task::RrcTask;
pub use tasks::{RrcMessage, Task, TaskHandle, TaskMessage};
pub use timer::OneShotTimer;
