//! Busy/idle resolution for the active case.
//!
//! The tracker is a pure state machine: callers open a refresh with [`StepTracker::begin`],
//! perform the round trip themselves, and hand the outcome back through
//! [`StepTracker::settle`] together with the ticket they were given. Only the most recently
//! issued ticket may settle; anything older is reported as [`Settled::Stale`] and leaves the
//! state untouched, so responses are applied in selection order rather than arrival order.

use shared::{domain::CaseNo, protocol::Step};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepState {
    /// No open step: the case is waiting on nothing, or its process has completed.
    Idle,
    Busy(Step),
    /// A lookup is in flight. `retained` is the open step known for this same case before
    /// the lookup started, kept for display only.
    Refreshing { retained: Option<Step> },
}

impl StepState {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }

    /// The step mutations may target. Only a settled `Busy` state qualifies.
    pub fn open_step(&self) -> Option<&Step> {
        match self {
            Self::Busy(step) => Some(step),
            _ => None,
        }
    }

    /// The step to show, including the one retained while refreshing.
    pub fn displayed_step(&self) -> Option<&Step> {
        match self {
            Self::Busy(step) => Some(step),
            Self::Refreshing { retained } => retained.as_ref(),
            Self::Idle => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    pub case_no: CaseNo,
    pub seq: u64,
}

/// Outcome of a current-step lookup as seen by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Open(Step),
    /// The server answered not-found: the case has no open step.
    NoOpenStep,
    /// Any other failure. The previously known state for the case is kept.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Applied(StepState),
    Stale,
}

#[derive(Debug)]
pub struct StepTracker {
    case_no: Option<CaseNo>,
    state: StepState,
    next_seq: u64,
    pending: Option<RefreshTicket>,
}

impl Default for StepTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StepTracker {
    pub fn new() -> Self {
        Self {
            case_no: None,
            state: StepState::Idle,
            next_seq: 0,
            pending: None,
        }
    }

    pub fn case_no(&self) -> Option<CaseNo> {
        self.case_no
    }

    pub fn state(&self) -> &StepState {
        &self.state
    }

    /// Starts a refresh for `case_no`, superseding any refresh still in flight.
    ///
    /// A step is only retained when the case is unchanged; a step of a previously
    /// tracked case must never be shown (or gated on) for a new one.
    pub fn begin(&mut self, case_no: CaseNo) -> RefreshTicket {
        let retained = if self.case_no == Some(case_no) {
            self.state.displayed_step().cloned()
        } else {
            None
        };
        self.next_seq += 1;
        let ticket = RefreshTicket {
            case_no,
            seq: self.next_seq,
        };
        if let Some(superseded) = self.pending.replace(ticket) {
            debug!(
                case_no = superseded.case_no.0,
                seq = superseded.seq,
                "superseding pending step refresh"
            );
        }
        self.case_no = Some(case_no);
        self.state = StepState::Refreshing { retained };
        ticket
    }

    /// Starts the re-resolution that follows a successful close of the open step.
    /// The closed step is dropped so a failed lookup falls back to idle rather than
    /// resurrecting it.
    pub fn begin_after_close(&mut self) -> Option<RefreshTicket> {
        let case_no = self.case_no?;
        self.state = StepState::Idle;
        Some(self.begin(case_no))
    }

    pub fn settle(&mut self, ticket: RefreshTicket, resolution: Resolution) -> Settled {
        if self.pending != Some(ticket) {
            debug!(
                case_no = ticket.case_no.0,
                seq = ticket.seq,
                "discarding stale step refresh"
            );
            return Settled::Stale;
        }
        self.pending = None;

        let retained = match &mut self.state {
            StepState::Refreshing { retained } => retained.take(),
            _ => None,
        };
        self.state = match resolution {
            Resolution::Open(step) if step.is_open() => StepState::Busy(step),
            Resolution::Open(_) | Resolution::NoOpenStep => StepState::Idle,
            Resolution::Failed => match retained {
                Some(step) => StepState::Busy(step),
                None => StepState::Idle,
            },
        };

        match &self.state {
            StepState::Busy(step) => info!(
                case_no = ticket.case_no.0,
                step_no = step.stepno.0,
                task_no = step.taskno.0,
                "case is busy"
            ),
            _ => info!(case_no = ticket.case_no.0, "case is idle"),
        }
        Settled::Applied(self.state.clone())
    }

    /// Forgets the tracked case and any refresh in flight.
    pub fn reset(&mut self) {
        self.case_no = None;
        self.state = StepState::Idle;
        self.pending = None;
    }
}

#[cfg(test)]
#[path = "tests/step_tracker_tests.rs"]
mod tests;
