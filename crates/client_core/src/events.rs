//! State-change events published by the portal, and user-facing notices.

use shared::{
    domain::CaseNo,
    protocol::{Case, ProcessData, ProcessDataType, ProcessType, Step},
};

use crate::{
    error::{ClientError, ErrorKind},
    gate::GateState,
    session::Capabilities,
    step_tracker::StepState,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceData {
    pub process_types: Vec<ProcessType>,
    pub process_data_types: Vec<ProcessDataType>,
}

#[derive(Debug, Clone)]
pub enum PortalEvent {
    SessionStarted {
        username: String,
        capabilities: Capabilities,
    },
    SessionEnded,
    SearchCompleted {
        query: String,
        results: Vec<Case>,
    },
    CaseSelected(Case),
    StepStateChanged {
        case_no: CaseNo,
        state: StepState,
    },
    GateChanged(GateState),
    ProcessDataListed {
        case_no: CaseNo,
        items: Vec<ProcessData>,
    },
    StepHistoryListed {
        case_no: CaseNo,
        steps: Vec<Step>,
    },
    ReferenceDataLoaded(ReferenceData),
    Notice(Notice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionContext {
    Login,
    Register,
    Logout,
    ReferenceData,
    Search,
    SelectCase,
    CreateCase,
    RefreshStep,
    LoadViews,
    AddProcessData,
    UpdateProcessData,
    CloseStep,
}

impl ActionContext {
    fn label(self) -> &'static str {
        match self {
            Self::Login => "Login",
            Self::Register => "Registration",
            Self::Logout => "Logout",
            Self::ReferenceData => "Loading reference data",
            Self::Search => "Search",
            Self::SelectCase => "Selecting case",
            Self::CreateCase => "Create case",
            Self::RefreshStep => "Refreshing current step",
            Self::LoadViews => "Loading case data",
            Self::AddProcessData => "Add process data",
            Self::UpdateProcessData => "Update process data",
            Self::CloseStep => "Close step",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A dismissable message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub context: ActionContext,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

impl Notice {
    pub fn success(context: ActionContext, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            context,
            kind: None,
            message: message.into(),
        }
    }

    pub fn info(context: ActionContext, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            context,
            kind: None,
            message: message.into(),
        }
    }

    pub fn failure(context: ActionContext, err: &ClientError) -> Self {
        let mut message = format!("{} failed: {err}", context.label());
        if err.requires_reauth() {
            message.push_str("; please sign in again");
        } else if err.is_retryable() {
            message.push_str("; retry when the server is reachable");
        }
        Self {
            level: NoticeLevel::Error,
            context,
            kind: Some(err.kind()),
            message,
        }
    }
}
