//! Cooperative procedure framework
//!
//! A procedure is a resumable state machine with an `init`/`step` lifecycle
//! and a `react(event)` handler for asynchronous inputs. Each call returns a
//! [`ProcOutcome`]: `Yield` suspends the procedure until the next external
//! stimulus, `Success`/`Error` terminate it. After a terminal outcome the
//! owning [`ProcHandle`] extracts the typed result and invokes
//! [`Procedure::then`] exactly once; the procedure is then disposed.
//!
//! Procedures never retain references to the context across a suspension
//! point: they receive an [`RrcContext`] per call and give it back when they
//! return. Sub-procedure launches go through the context's deferred action
//! queue so a procedure never re-enters another procedure synchronously.

pub mod cell_selection;
pub mod connection_setup;
pub mod manager;
pub mod reconfiguration;
pub mod setup_request;

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use uecp_common::config::UeConfig;

use crate::cell_list::CellList;
use crate::interfaces::{CellSearchArgs, RadioInterface, RrcIndication, StackInterface};
use crate::state::RrcStateMachine;
use crate::timer::OneShotTimer;

pub use cell_selection::CellSelectionProc;
pub use connection_setup::ConnectionSetupProc;
pub use manager::ProcManager;
pub use reconfiguration::ReconfigurationProc;
pub use setup_request::SetupRequestProc;

/// Outcome of one `init`/`step`/`react` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcOutcome {
    /// Still running; the procedure must be polled again after the next
    /// external stimulus
    Yield,
    /// Terminated successfully
    Success,
    /// Terminated with an error
    Error,
}

impl ProcOutcome {
    /// True for `Success` and `Error`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcOutcome::Yield)
    }
}

impl fmt::Display for ProcOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcOutcome::Yield => write!(f, "yield"),
            ProcOutcome::Success => write!(f, "success"),
            ProcOutcome::Error => write!(f, "error"),
        }
    }
}

/// Errors from launching procedures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcError {
    /// The procedure slot is already occupied by a running instance.
    #[error("procedure {0} is already running")]
    Busy(&'static str),
}

/// Work a procedure asks the manager to perform on its behalf.
///
/// Drained by the manager after the triggering call returns, so the launch
/// never happens re-entrantly inside another procedure's `init`/`react`.
#[derive(Debug)]
pub enum DeferredAction {
    /// Launch (or await an already-running) cell selection.
    StartCellSelection(CellSearchArgs),
}

/// Per-call collaborator bundle handed to procedures.
///
/// Borrowed for the duration of a single `init`/`step`/`react` call; a
/// procedure must not stash any of these references, since the cell list may
/// be mutated by other code paths between calls.
pub struct RrcContext<'a> {
    /// UE configuration
    pub cfg: &'a UeConfig,
    /// Tracked cells
    pub cells: &'a mut CellList,
    /// Connection state machine
    pub state: &'a mut RrcStateMachine,
    /// Establishment guard timer, shared between setup request (starts it)
    /// and connection setup (stops it)
    pub t300: &'a mut OneShotTimer,
    /// Physical-layer collaborator
    pub radio: &'a mut dyn RadioInterface,
    /// Stack-side collaborator
    pub stack: &'a mut dyn StackInterface,
    /// Upper-layer notification queue
    pub indications: &'a mut VecDeque<RrcIndication>,
    /// Deferred work for the procedure manager
    pub actions: &'a mut VecDeque<DeferredAction>,
}

/// A cooperative control-plane procedure.
///
/// `init` may complete the whole procedure synchronously; otherwise the
/// procedure yields and is resumed through `react` (asynchronous inputs) and
/// `step` (cooperative re-polls, e.g. to observe a guard timer). Once a call
/// returns a terminal outcome the framework calls `take_result` followed by
/// `then`, both exactly once.
pub trait Procedure {
    /// Asynchronous inputs this procedure reacts to.
    type Event;
    /// Success value.
    type Output;
    /// Typed terminal error.
    type Failure: fmt::Display;

    /// Name used in logs.
    const NAME: &'static str;

    /// Starts the procedure.
    fn init(&mut self, ctx: &mut RrcContext<'_>) -> ProcOutcome;

    /// Cooperative re-poll; default procedures are purely event-driven.
    fn step(&mut self, _ctx: &mut RrcContext<'_>) -> ProcOutcome {
        ProcOutcome::Yield
    }

    /// Delivers an asynchronous event.
    fn react(&mut self, ctx: &mut RrcContext<'_>, event: Self::Event) -> ProcOutcome;

    /// Yields the stored terminal result. Called once, immediately after a
    /// terminal outcome; `None` indicates an internal inconsistency.
    fn take_result(&mut self) -> Option<Result<Self::Output, Self::Failure>>;

    /// Completion continuation, invoked exactly once per run.
    fn then(&mut self, _ctx: &mut RrcContext<'_>, _result: &Result<Self::Output, Self::Failure>) {}
}

/// Owning slot for at most one running instance of a procedure type.
///
/// The handle is the procedure's storage: launching moves the instance in,
/// completion moves it out and disposes it after `then` has run.
#[derive(Debug)]
pub struct ProcHandle<P> {
    running: Option<P>,
}

impl<P> Default for ProcHandle<P> {
    fn default() -> Self {
        Self { running: None }
    }
}

impl<P: Procedure> ProcHandle<P> {
    /// Creates an idle handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while an instance is running.
    pub fn is_busy(&self) -> bool {
        self.running.is_some()
    }

    /// Launches a procedure. Returns the completed result when `init`
    /// terminates synchronously, `None` when the procedure yielded.
    #[allow(clippy::type_complexity)]
    pub fn launch(
        &mut self,
        ctx: &mut RrcContext<'_>,
        mut proc: P,
    ) -> Result<Option<Result<P::Output, P::Failure>>, ProcError> {
        if self.is_busy() {
            return Err(ProcError::Busy(P::NAME));
        }
        info!("launching procedure {}", P::NAME);
        let outcome = proc.init(ctx);
        if outcome.is_terminal() {
            return Ok(Self::complete(ctx, proc, outcome));
        }
        self.running = Some(proc);
        Ok(None)
    }

    /// Delivers an event to the running instance. Events for an idle handle
    /// are logged and dropped.
    #[allow(clippy::type_complexity)]
    pub fn trigger(
        &mut self,
        ctx: &mut RrcContext<'_>,
        event: P::Event,
    ) -> Option<Result<P::Output, P::Failure>> {
        let Some(proc) = self.running.as_mut() else {
            warn!("event for idle procedure {} dropped", P::NAME);
            return None;
        };
        let outcome = proc.react(ctx, event);
        self.finish_if_terminal(ctx, outcome)
    }

    /// Re-polls the running instance.
    #[allow(clippy::type_complexity)]
    pub fn step(&mut self, ctx: &mut RrcContext<'_>) -> Option<Result<P::Output, P::Failure>> {
        let proc = self.running.as_mut()?;
        let outcome = proc.step(ctx);
        self.finish_if_terminal(ctx, outcome)
    }

    #[allow(clippy::type_complexity)]
    fn finish_if_terminal(
        &mut self,
        ctx: &mut RrcContext<'_>,
        outcome: ProcOutcome,
    ) -> Option<Result<P::Output, P::Failure>> {
        if !outcome.is_terminal() {
            return None;
        }
        let proc = self.running.take()?;
        Self::complete(ctx, proc, outcome)
    }

    #[allow(clippy::type_complexity)]
    fn complete(
        ctx: &mut RrcContext<'_>,
        mut proc: P,
        outcome: ProcOutcome,
    ) -> Option<Result<P::Output, P::Failure>> {
        let Some(result) = proc.take_result() else {
            warn!("procedure {} terminated ({outcome}) without a result", P::NAME);
            return None;
        };
        match &result {
            Ok(_) => info!("procedure {} completed successfully", P::NAME),
            Err(e) => warn!("procedure {} failed: {e}", P::NAME),
        }
        proc.then(ctx, &result);
        Some(result)
    }
}
