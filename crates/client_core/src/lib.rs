use async_trait::async_trait;
use shared::{
    domain::{CaseNo, ProcessDataNo, ProcessNo, ProcessTypeNo, StepNo},
    protocol::{
        Case, CloseStepRequest, CreateCaseRequest, ProcessData, ProcessDataType, ProcessDataWrite,
        ProcessType, RegisterRequest, Step, TokenResponse, UserProfile,
    },
};

pub mod error;
pub mod events;
pub mod forms;
pub mod gate;
pub mod http;
pub mod portal;
pub mod selector;
pub mod session;
pub mod step_tracker;
pub mod views;

pub use error::{ClientError, ClientResult, ErrorKind};
pub use events::{ActionContext, Notice, NoticeLevel, PortalEvent, ReferenceData};
pub use forms::{NewCase, ProcessDataInput};
pub use gate::{GateBlock, GateState, ProcessDataGate};
pub use http::HttpWorkflowApi;
pub use portal::{PortalSnapshot, UserPortal};
pub use session::{Caller, Capabilities, Session, SessionState};
pub use step_tracker::{StepState, StepTracker};
pub use views::CaseDataViews;

/// Remote operations of the workflow REST API.
///
/// Every call except the token grant and registration is authenticated with the bearer
/// token of the current session and fails with [`ClientError::NoSession`] without one.
#[async_trait]
pub trait WorkflowApi: Send + Sync {
    async fn request_token(&self, username: &str, password: &str) -> ClientResult<TokenResponse>;
    async fn current_user(&self) -> ClientResult<UserProfile>;
    async fn register(&self, request: &RegisterRequest) -> ClientResult<UserProfile>;

    /// Cases visible to the caller as far as the server is concerned. Callers still
    /// filter by ownership.
    async fn list_cases(&self) -> ClientResult<Vec<Case>>;
    async fn get_case(&self, case_no: CaseNo) -> ClientResult<Case>;
    /// Not-found means the case has no open step.
    async fn current_step(&self, case_no: CaseNo) -> ClientResult<Step>;
    async fn case_process_data(&self, case_no: CaseNo) -> ClientResult<Vec<ProcessData>>;
    async fn case_steps(&self, case_no: CaseNo) -> ClientResult<Vec<Step>>;

    async fn add_process_data(
        &self,
        process_no: ProcessNo,
        body: &ProcessDataWrite,
    ) -> ClientResult<ProcessData>;
    async fn update_process_data(
        &self,
        process_data_no: ProcessDataNo,
        body: &ProcessDataWrite,
    ) -> ClientResult<ProcessData>;
    async fn close_step(&self, step_no: StepNo, body: &CloseStepRequest) -> ClientResult<()>;
    async fn create_case(
        &self,
        process_type_no: ProcessTypeNo,
        body: &CreateCaseRequest,
    ) -> ClientResult<Case>;

    async fn list_process_types(&self) -> ClientResult<Vec<ProcessType>>;
    async fn list_process_data_types(&self) -> ClientResult<Vec<ProcessDataType>>;
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
