//! In-memory [`WorkflowApi`] used by the unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{
        CaseNo, ProcessDataNo, ProcessDataTypeNo, ProcessNo, ProcessTypeNo, StatusNo, StepNo,
        TaskNo,
    },
    error::ApiError,
    protocol::{
        Case, CloseStepRequest, CreateCaseRequest, ProcessData, ProcessDataType, ProcessDataWrite,
        ProcessType, RegisterRequest, Step, TokenResponse, UserProfile,
    },
};
use tokio::sync::Notify;

use crate::{
    error::{ClientError, ClientResult},
    portal::UserPortal,
    session::{Capabilities, Session, SessionState},
    WorkflowApi,
};

pub(crate) fn case(caseno: i64, client_id: &str, owner: &str) -> Case {
    Case {
        caseno: CaseNo(caseno),
        client_id: client_id.to_string(),
        client_type: "company".to_string(),
        usrid: owner.to_string(),
        date_created: None,
    }
}

pub(crate) fn step(stepno: i64, processno: i64, taskno: i64) -> Step {
    Step {
        stepno: StepNo(stepno),
        processno: ProcessNo(processno),
        taskno: TaskNo(taskno),
        status_no: StatusNo(1),
        date_started: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        date_ended: None,
    }
}

pub(crate) fn api_error(status: u16) -> ClientError {
    ClientError::Api(ApiError::from_response(status, r#"{"detail":"scripted failure"}"#).into())
}

/// A current-step lookup parked until the test releases it.
#[derive(Default)]
pub(crate) struct HeldCall {
    entered: Notify,
    release: Notify,
}

impl HeldCall {
    pub(crate) async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn release(&self) {
        self.release.notify_one();
    }

    async fn park(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct FakeState {
    users: HashMap<String, (String, String)>,
    cases: Vec<Case>,
    open_steps: HashMap<CaseNo, Step>,
    next_steps: HashMap<CaseNo, Step>,
    history: HashMap<CaseNo, Vec<Step>>,
    process_data: Vec<ProcessData>,
    failures: HashMap<&'static str, u16>,
    held: HashMap<CaseNo, Arc<HeldCall>>,
    held_endpoints: HashMap<&'static str, Arc<HeldCall>>,
    calls: Vec<String>,
    next_id: i64,
}

pub(crate) struct FakeApi {
    session: Arc<SessionState>,
    state: StdMutex<FakeState>,
}

impl FakeApi {
    pub(crate) fn new(session: Arc<SessionState>) -> Arc<Self> {
        Arc::new(Self {
            session,
            state: StdMutex::new(FakeState {
                next_id: 1000,
                ..FakeState::default()
            }),
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn add_user(&self, username: &str, password: &str, role: &str) {
        self.with_state(|s| {
            s.users
                .insert(username.to_string(), (password.to_string(), role.to_string()))
        });
    }

    pub(crate) fn add_case(&self, case: Case) {
        self.with_state(|s| s.cases.push(case));
    }

    pub(crate) fn open_step(&self, case_no: CaseNo, step: Step) {
        self.with_state(|s| s.open_steps.insert(case_no, step));
    }

    /// The step the server opens once the current one of `case_no` is closed.
    pub(crate) fn script_next_step(&self, case_no: CaseNo, step: Step) {
        self.with_state(|s| s.next_steps.insert(case_no, step));
    }

    pub(crate) fn add_process_data_item(&self, item: ProcessData) {
        self.with_state(|s| s.process_data.push(item));
    }

    pub(crate) fn fail(&self, endpoint: &'static str, status: u16) {
        self.with_state(|s| s.failures.insert(endpoint, status));
    }

    pub(crate) fn clear_failure(&self, endpoint: &'static str) {
        self.with_state(|s| s.failures.remove(endpoint));
    }

    /// Parks the next current-step lookup for `case_no`.
    pub(crate) fn hold_current_step(&self, case_no: CaseNo) -> Arc<HeldCall> {
        let held = Arc::new(HeldCall::default());
        self.with_state(|s| s.held.insert(case_no, held.clone()));
        held
    }

    /// Parks the next authenticated call to `endpoint`. Failures scripted while it is
    /// parked apply once it is released.
    pub(crate) fn hold(&self, endpoint: &'static str) -> Arc<HeldCall> {
        let held = Arc::new(HeldCall::default());
        self.with_state(|s| s.held_endpoints.insert(endpoint, held.clone()));
        held
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.with_state(|s| s.calls.clone())
    }

    pub(crate) fn count_calls(&self, prefix: &str) -> usize {
        self.with_state(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).count())
    }

    pub(crate) fn clear_calls(&self) {
        self.with_state(|s| s.calls.clear());
    }

    fn scripted_failure(&self, endpoint: &'static str) -> ClientResult<()> {
        match self.with_state(|s| s.failures.get(endpoint).copied()) {
            Some(status) => Err(api_error(status)),
            None => Ok(()),
        }
    }

    fn record(&self, endpoint: &'static str, call: String) -> ClientResult<()> {
        self.with_state(|s| s.calls.push(call));
        self.scripted_failure(endpoint)
    }

    async fn authorized(&self, endpoint: &'static str, call: String) -> ClientResult<String> {
        let token = self.session.token().await.ok_or(ClientError::NoSession)?;
        self.record(endpoint, call)?;
        let held = self.with_state(|s| s.held_endpoints.remove(endpoint));
        if let Some(held) = held {
            held.park().await;
            self.scripted_failure(endpoint)?;
        }
        token
            .strip_prefix("token-")
            .map(str::to_string)
            .ok_or_else(|| api_error(401))
    }

    fn next_id(&self) -> i64 {
        self.with_state(|s| {
            s.next_id += 1;
            s.next_id
        })
    }
}

#[async_trait]
impl WorkflowApi for FakeApi {
    async fn request_token(&self, username: &str, password: &str) -> ClientResult<TokenResponse> {
        self.record("request_token", format!("request_token:{username}"))?;
        let known = self.with_state(|s| {
            s.users
                .get(username)
                .is_some_and(|(stored, _)| stored == password)
        });
        if !known {
            return Err(api_error(401));
        }
        Ok(TokenResponse {
            access_token: format!("token-{username}"),
            token_type: "bearer".to_string(),
        })
    }

    async fn current_user(&self) -> ClientResult<UserProfile> {
        let username = self.authorized("current_user", "current_user".into()).await?;
        let role = self
            .with_state(|s| s.users.get(&username).map(|(_, role)| role.clone()))
            .ok_or_else(|| api_error(401))?;
        Ok(UserProfile {
            id: 1,
            username,
            role,
        })
    }

    async fn register(&self, request: &RegisterRequest) -> ClientResult<UserProfile> {
        self.record("register", format!("register:{}", request.username))?;
        let taken = self.with_state(|s| s.users.contains_key(&request.username));
        if taken {
            return Err(api_error(400));
        }
        self.add_user(&request.username, &request.password, &request.role);
        Ok(UserProfile {
            id: self.next_id(),
            username: request.username.clone(),
            role: request.role.clone(),
        })
    }

    async fn list_cases(&self) -> ClientResult<Vec<Case>> {
        self.authorized("list_cases", "list_cases".into()).await?;
        Ok(self.with_state(|s| s.cases.clone()))
    }

    async fn get_case(&self, case_no: CaseNo) -> ClientResult<Case> {
        self.authorized("get_case", format!("get_case:{case_no}"))
            .await?;
        self.with_state(|s| s.cases.iter().find(|c| c.caseno == case_no).cloned())
            .ok_or_else(|| api_error(404))
    }

    async fn current_step(&self, case_no: CaseNo) -> ClientResult<Step> {
        self.authorized("current_step", format!("current_step:{case_no}"))
            .await?;
        let held = self.with_state(|s| s.held.remove(&case_no));
        if let Some(held) = held {
            held.park().await;
            self.scripted_failure("current_step")?;
        }
        self.with_state(|s| s.open_steps.get(&case_no).cloned())
            .ok_or_else(|| api_error(404))
    }

    async fn case_process_data(&self, case_no: CaseNo) -> ClientResult<Vec<ProcessData>> {
        self.authorized("case_process_data", format!("case_process_data:{case_no}"))
            .await?;
        Ok(self.with_state(|s| {
            let processes: Vec<ProcessNo> = s
                .open_steps
                .get(&case_no)
                .into_iter()
                .chain(s.history.get(&case_no).into_iter().flatten())
                .map(|step| step.processno)
                .collect();
            s.process_data
                .iter()
                .filter(|item| processes.contains(&item.processno))
                .cloned()
                .collect()
        }))
    }

    async fn case_steps(&self, case_no: CaseNo) -> ClientResult<Vec<Step>> {
        self.authorized("case_steps", format!("case_steps:{case_no}"))
            .await?;
        Ok(self.with_state(|s| {
            let mut steps = s.history.get(&case_no).cloned().unwrap_or_default();
            steps.extend(s.open_steps.get(&case_no).cloned());
            steps
        }))
    }

    async fn add_process_data(
        &self,
        process_no: ProcessNo,
        body: &ProcessDataWrite,
    ) -> ClientResult<ProcessData> {
        self.authorized(
            "add_process_data",
            format!("add_process_data:{process_no}:{}={}", body.fieldname, body.value),
        )
        .await?;
        let item = ProcessData {
            process_data_no: ProcessDataNo(self.next_id()),
            processno: process_no,
            process_data_type_no: body.process_data_type_no,
            fieldname: body.fieldname.clone(),
            value: body.value.clone(),
        };
        self.add_process_data_item(item.clone());
        Ok(item)
    }

    async fn update_process_data(
        &self,
        process_data_no: ProcessDataNo,
        body: &ProcessDataWrite,
    ) -> ClientResult<ProcessData> {
        self.authorized(
            "update_process_data",
            format!("update_process_data:{process_data_no}:{}={}", body.fieldname, body.value),
        )
        .await?;
        self.with_state(|s| {
            let item = s
                .process_data
                .iter_mut()
                .find(|item| item.process_data_no == process_data_no)?;
            item.process_data_type_no = body.process_data_type_no;
            item.fieldname = body.fieldname.clone();
            item.value = body.value.clone();
            Some(item.clone())
        })
        .ok_or_else(|| api_error(404))
    }

    async fn close_step(&self, step_no: StepNo, _body: &CloseStepRequest) -> ClientResult<()> {
        self.authorized("close_step", format!("close_step:{step_no}"))
            .await?;
        self.with_state(|s| {
            let case_no = s
                .open_steps
                .iter()
                .find(|(_, open)| open.stepno == step_no)
                .map(|(case_no, _)| *case_no)
                .ok_or_else(|| api_error(404))?;
            if let Some(mut closed) = s.open_steps.remove(&case_no) {
                closed.date_ended = Some(Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap());
                s.history.entry(case_no).or_default().push(closed);
            }
            if let Some(next) = s.next_steps.remove(&case_no) {
                s.open_steps.insert(case_no, next);
            }
            Ok(())
        })
    }

    async fn create_case(
        &self,
        process_type_no: ProcessTypeNo,
        body: &CreateCaseRequest,
    ) -> ClientResult<Case> {
        self.authorized(
            "create_case",
            format!("create_case:{process_type_no}:{}", body.client_id),
        )
        .await?;
        let caseno = self.next_id();
        let created = Case {
            caseno: CaseNo(caseno),
            client_id: body.client_id.clone(),
            client_type: body.client_type.clone(),
            usrid: body.usrid.clone(),
            date_created: None,
        };
        self.add_case(created.clone());
        self.open_step(created.caseno, step(self.next_id(), caseno + 1, 1));
        Ok(created)
    }

    async fn list_process_types(&self) -> ClientResult<Vec<ProcessType>> {
        self.authorized("list_process_types", "list_process_types".into())
            .await?;
        Ok(vec![ProcessType {
            process_type_no: ProcessTypeNo(1),
            description: "Onboarding".to_string(),
        }])
    }

    async fn list_process_data_types(&self) -> ClientResult<Vec<ProcessDataType>> {
        self.authorized("list_process_data_types", "list_process_data_types".into())
            .await?;
        Ok(vec![ProcessDataType {
            process_data_type_no: ProcessDataTypeNo(1),
            description: "Amount".to_string(),
        }])
    }
}

/// A portal over a fresh fake with `username` already signed in.
pub(crate) async fn signed_in_portal(username: &str, role: &str) -> (Arc<UserPortal>, Arc<FakeApi>) {
    let session = Arc::new(SessionState::new());
    let api = FakeApi::new(session.clone());
    api.add_user(username, "secret", role);
    session
        .begin(Session {
            token: format!("token-{username}"),
            username: username.to_string(),
            capabilities: Capabilities::from_server_role(role),
        })
        .await;
    let portal = UserPortal::new(api.clone(), session);
    (portal, api)
}
