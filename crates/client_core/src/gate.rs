//! Enables process-data entry only while the active case has a known open step.

use shared::{
    domain::{CaseNo, ProcessNo, StepNo},
    protocol::Step,
};

use crate::{
    error::{ClientError, ClientResult},
    step_tracker::StepState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateBlock {
    NoCase,
    NoOpenStep,
    Refreshing,
}

impl std::fmt::Display for GateBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NoCase => "create or select a case first",
            Self::NoOpenStep => {
                "case is not busy (no active step); adding or editing process data is disabled"
            }
            Self::Refreshing => "current step is being refreshed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Enabled {
        case_no: CaseNo,
        process_no: ProcessNo,
        step_no: StepNo,
    },
    Disabled(GateBlock),
}

impl GateState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled { .. })
    }
}

/// Derives gate state from the tracker alone.
pub fn evaluate(case_no: Option<CaseNo>, state: &StepState) -> GateState {
    let Some(case_no) = case_no else {
        return GateState::Disabled(GateBlock::NoCase);
    };
    match state {
        StepState::Busy(Step {
            stepno, processno, ..
        }) => GateState::Enabled {
            case_no,
            process_no: *processno,
            step_no: *stepno,
        },
        StepState::Refreshing { .. } => GateState::Disabled(GateBlock::Refreshing),
        StepState::Idle => GateState::Disabled(GateBlock::NoOpenStep),
    }
}

#[derive(Debug)]
pub struct ProcessDataGate {
    state: GateState,
}

impl Default for ProcessDataGate {
    fn default() -> Self {
        Self {
            state: GateState::Disabled(GateBlock::NoCase),
        }
    }
}

impl ProcessDataGate {
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Re-evaluates against the tracker. Returns the new state when it changed.
    pub fn update(&mut self, case_no: Option<CaseNo>, tracker_state: &StepState) -> Option<GateState> {
        let next = evaluate(case_no, tracker_state);
        if next == self.state {
            return None;
        }
        self.state = next;
        Some(next)
    }

    /// Returns the process a submission may target, or the reason it is blocked.
    pub fn authorize(&self) -> ClientResult<(CaseNo, ProcessNo)> {
        match self.state {
            GateState::Enabled {
                case_no,
                process_no,
                ..
            } => Ok((case_no, process_no)),
            GateState::Disabled(block) => Err(ClientError::GateClosed(block)),
        }
    }
}
