use std::fmt::Write as _;

use client_core::{
    GateBlock, GateState, NoticeLevel, PortalEvent, PortalSnapshot, ReferenceData, StepState,
};
use shared::protocol::{Case, ProcessData, Step};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::warn;

/// Prints portal events until the portal goes away.
pub fn spawn_printer(mut events: broadcast::Receiver<PortalEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(text) = event_line(&event) {
                        println!("{text}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

pub fn event_line(event: &PortalEvent) -> Option<String> {
    match event {
        PortalEvent::SessionStarted {
            username,
            capabilities,
        } => {
            let mut scope = if capabilities.can_see_all_cases() {
                "all cases".to_string()
            } else {
                "own cases".to_string()
            };
            if capabilities.can_edit_reference_data() {
                scope.push_str(", reference data editable");
            }
            Some(format!("signed in as {username} ({scope})"))
        }
        PortalEvent::SessionEnded => Some("signed out".to_string()),
        PortalEvent::SearchCompleted { query, results } => {
            if results.is_empty() {
                return None;
            }
            let mut out = format!("{} case(s) match '{query}':", results.len());
            for case in results {
                let _ = write!(out, "\n  {}", case_line(case));
            }
            Some(out)
        }
        PortalEvent::CaseSelected(case) => Some(format!("selected {}", case_line(case))),
        PortalEvent::StepStateChanged { case_no, state } => match state {
            StepState::Refreshing { .. } => None,
            StepState::Busy(step) => Some(format!(
                "case #{case_no} is busy: step #{} (task {}, process {})",
                step.stepno, step.taskno, step.processno
            )),
            StepState::Idle => Some(format!("case #{case_no} is idle (no active step)")),
        },
        PortalEvent::GateChanged(GateState::Enabled { .. }) => {
            Some("process data entry enabled".to_string())
        }
        PortalEvent::GateChanged(GateState::Disabled(GateBlock::NoOpenStep)) => {
            Some("process data entry disabled: no active step".to_string())
        }
        PortalEvent::GateChanged(GateState::Disabled(_)) => None,
        PortalEvent::ProcessDataListed { case_no, items } => {
            Some(process_data_table(*case_no, items))
        }
        PortalEvent::StepHistoryListed { case_no, steps } => Some(step_table(*case_no, steps)),
        PortalEvent::ReferenceDataLoaded(reference) => Some(format!(
            "loaded {} process type(s), {} data type(s)",
            reference.process_types.len(),
            reference.process_data_types.len()
        )),
        PortalEvent::Notice(notice) => {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Success => "ok",
                NoticeLevel::Error => "error",
            };
            Some(format!("[{tag}] {}", notice.message))
        }
    }
}

fn case_line(case: &Case) -> String {
    format!(
        "#{} {} ({}) owner {}",
        case.caseno, case.client_id, case.client_type, case.usrid
    )
}

fn process_data_table(case_no: shared::domain::CaseNo, items: &[ProcessData]) -> String {
    if items.is_empty() {
        return format!("case #{case_no}: no process data");
    }
    let mut out = format!("case #{case_no} process data:");
    for item in items {
        let _ = write!(
            out,
            "\n  [{}] type {} {} = {}",
            item.process_data_no, item.process_data_type_no, item.fieldname, item.value
        );
    }
    out
}

fn step_table(case_no: shared::domain::CaseNo, steps: &[Step]) -> String {
    if steps.is_empty() {
        return format!("case #{case_no}: no steps");
    }
    let mut out = format!("case #{case_no} steps:");
    for step in steps {
        let ended = match step.date_ended {
            Some(ended) => ended.format("%Y-%m-%d %H:%M").to_string(),
            None => "open".to_string(),
        };
        let _ = write!(
            out,
            "\n  step #{} task {} status {} started {} ended {}",
            step.stepno,
            step.taskno,
            step.status_no,
            step.date_started.format("%Y-%m-%d %H:%M"),
            ended
        );
    }
    out
}

pub fn snapshot(snapshot: &PortalSnapshot) -> String {
    let Some(case) = &snapshot.active_case else {
        return "no active case".to_string();
    };
    let status = match &snapshot.step {
        StepState::Busy(step) => format!("busy on step #{} (task {})", step.stepno, step.taskno),
        StepState::Idle => "idle".to_string(),
        StepState::Refreshing { .. } => "refreshing".to_string(),
    };
    let gate = match snapshot.gate {
        GateState::Enabled { .. } => "enabled".to_string(),
        GateState::Disabled(block) => format!("disabled ({block})"),
    };
    format!(
        "{}\n  status: {status}\n  process data entry: {gate}\n{}\n{}",
        case_line(case),
        process_data_table(case.caseno, &snapshot.process_data),
        step_table(case.caseno, &snapshot.steps)
    )
}

pub fn reference(reference: &ReferenceData) -> String {
    let mut out = String::from("process types:");
    for ptype in &reference.process_types {
        let _ = write!(out, "\n  {} {}", ptype.process_type_no, ptype.description);
    }
    out.push_str("\nprocess data types:");
    for dtype in &reference.process_data_types {
        let _ = write!(out, "\n  {} {}", dtype.process_data_type_no, dtype.description);
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use client_core::{ActionContext, Capabilities, Notice};
    use shared::domain::{CaseNo, ProcessNo, StatusNo, StepNo, TaskNo};

    use super::*;

    fn step() -> Step {
        Step {
            stepno: StepNo(7),
            processno: ProcessNo(5),
            taskno: TaskNo(3),
            status_no: StatusNo(1),
            date_started: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            date_ended: None,
        }
    }

    #[test]
    fn step_transitions_are_readable() {
        let busy = PortalEvent::StepStateChanged {
            case_no: CaseNo(42),
            state: StepState::Busy(step()),
        };
        assert_eq!(
            event_line(&busy).as_deref(),
            Some("case #42 is busy: step #7 (task 3, process 5)")
        );

        let refreshing = PortalEvent::StepStateChanged {
            case_no: CaseNo(42),
            state: StepState::Refreshing { retained: None },
        };
        assert!(event_line(&refreshing).is_none());
    }

    #[test]
    fn sign_in_line_shows_scope() {
        let admin = PortalEvent::SessionStarted {
            username: "root".to_string(),
            capabilities: Capabilities::from_server_role("admin"),
        };
        assert_eq!(
            event_line(&admin).as_deref(),
            Some("signed in as root (all cases, reference data editable)")
        );

        let user = PortalEvent::SessionStarted {
            username: "alice".to_string(),
            capabilities: Capabilities::from_server_role("user"),
        };
        assert_eq!(
            event_line(&user).as_deref(),
            Some("signed in as alice (own cases)")
        );
    }

    #[test]
    fn notices_are_tagged_by_level() {
        let notice = PortalEvent::Notice(Notice::success(ActionContext::CloseStep, "Step #7 closed"));
        assert_eq!(event_line(&notice).as_deref(), Some("[ok] Step #7 closed"));
    }

    #[test]
    fn open_steps_show_as_open() {
        let table = step_table(CaseNo(42), &[step()]);
        assert!(table.contains("step #7 task 3 status 1 started 2024-05-01 10:00 ended open"));
    }
}
