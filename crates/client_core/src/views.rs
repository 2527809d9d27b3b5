//! Read-only process-data and step-history lists for the active case.

use shared::{
    domain::{CaseNo, ProcessDataNo},
    protocol::{ProcessData, Step},
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTicket {
    pub case_no: CaseNo,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct CaseDataViews {
    case_no: Option<CaseNo>,
    generation: u64,
    process_data: Vec<ProcessData>,
    steps: Vec<Step>,
}

impl CaseDataViews {
    pub fn case_no(&self) -> Option<CaseNo> {
        self.case_no
    }

    pub fn process_data(&self) -> &[ProcessData] {
        &self.process_data
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn find_process_data(&self, process_data_no: ProcessDataNo) -> Option<&ProcessData> {
        self.process_data
            .iter()
            .find(|item| item.process_data_no == process_data_no)
    }

    /// Opens a render pass. Lists of a different case are dropped immediately.
    pub fn begin(&mut self, case_no: CaseNo) -> ViewTicket {
        if self.case_no != Some(case_no) {
            self.process_data.clear();
            self.steps.clear();
            self.case_no = Some(case_no);
        }
        self.generation += 1;
        ViewTicket {
            case_no,
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: ViewTicket) -> bool {
        self.case_no == Some(ticket.case_no) && self.generation == ticket.generation
    }

    pub fn apply_process_data(&mut self, ticket: ViewTicket, items: Vec<ProcessData>) -> bool {
        if !self.is_current(ticket) {
            debug!(case_no = ticket.case_no.0, generation = ticket.generation, "discarding stale process-data list");
            return false;
        }
        self.process_data = items;
        true
    }

    pub fn apply_steps(&mut self, ticket: ViewTicket, steps: Vec<Step>) -> bool {
        if !self.is_current(ticket) {
            debug!(case_no = ticket.case_no.0, generation = ticket.generation, "discarding stale step history");
            return false;
        }
        self.steps = steps;
        true
    }

    pub fn reset(&mut self) {
        self.case_no = None;
        self.generation += 1;
        self.process_data.clear();
        self.steps.clear();
    }
}

#[cfg(test)]
mod tests {
    use shared::domain::{ProcessDataTypeNo, ProcessNo};

    use super::*;

    fn item(no: i64, field: &str) -> ProcessData {
        ProcessData {
            process_data_no: ProcessDataNo(no),
            processno: ProcessNo(5),
            process_data_type_no: ProcessDataTypeNo(1),
            fieldname: field.to_string(),
            value: "v".to_string(),
        }
    }

    #[test]
    fn only_latest_render_applies() {
        let mut views = CaseDataViews::default();
        let first = views.begin(CaseNo(1));
        let second = views.begin(CaseNo(1));

        assert!(!views.apply_process_data(first, vec![item(1, "old")]));
        assert!(views.apply_process_data(second, vec![item(2, "new")]));
        assert_eq!(views.process_data().len(), 1);
        assert_eq!(views.process_data()[0].fieldname, "new");
    }

    #[test]
    fn switching_case_clears_lists_and_rejects_old_case() {
        let mut views = CaseDataViews::default();
        let a = views.begin(CaseNo(1));
        assert!(views.apply_process_data(a, vec![item(1, "a")]));

        let b = views.begin(CaseNo(2));
        assert!(views.process_data().is_empty());
        assert!(!views.apply_steps(a, Vec::new()));
        assert!(views.apply_steps(b, Vec::new()));
        assert_eq!(views.case_no(), Some(CaseNo(2)));
    }

    #[test]
    fn finds_items_for_editing() {
        let mut views = CaseDataViews::default();
        let ticket = views.begin(CaseNo(1));
        views.apply_process_data(ticket, vec![item(1, "a"), item(9, "amount")]);
        assert_eq!(
            views
                .find_process_data(ProcessDataNo(9))
                .map(|i| i.fieldname.as_str()),
            Some("amount")
        );
        assert!(views.find_process_data(ProcessDataNo(3)).is_none());
    }
}
