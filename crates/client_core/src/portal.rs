//! The user-portal orchestrator.
//!
//! [`UserPortal`] ties case selection, step tracking, gating and the case views together
//! for one session. Its state sits behind a mutex that is only held between network
//! round trips, never across them, so actions may interleave freely; ordering is
//! restored by the tickets handed out by [`StepTracker`] and [`CaseDataViews`].
//!
//! Every public action is an error boundary: failures are logged, published as a
//! [`Notice`] and returned. Authorization failures additionally end the session they
//! were issued under.

use std::sync::Arc;

use shared::{
    domain::{CaseNo, ProcessDataNo},
    protocol::{Case, CloseStepRequest, ProcessData, RegisterRequest, Step},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    error::{ClientError, ClientResult},
    events::{ActionContext, Notice, PortalEvent, ReferenceData},
    forms::{require_credentials, NewCase, ProcessDataInput},
    gate::{GateBlock, GateState, ProcessDataGate},
    selector,
    session::{Caller, Capabilities, Session, SessionState},
    step_tracker::{RefreshTicket, Resolution, Settled, StepState, StepTracker},
    views::CaseDataViews,
    WorkflowApi,
};

const EVENT_CAPACITY: usize = 256;

/// Point-in-time copy of what the portal displays.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalSnapshot {
    pub active_case: Option<Case>,
    pub step: StepState,
    pub gate: GateState,
    pub process_data: Vec<ProcessData>,
    pub steps: Vec<Step>,
    pub search_results: Vec<Case>,
    pub reference: ReferenceData,
}

#[derive(Default)]
struct PortalState {
    active_case: Option<Case>,
    search_results: Vec<Case>,
    tracker: StepTracker,
    gate: ProcessDataGate,
    views: CaseDataViews,
    reference: ReferenceData,
}

impl PortalState {
    fn active_case_no(&self) -> Option<CaseNo> {
        self.active_case.as_ref().map(|case| case.caseno)
    }
}

pub struct UserPortal {
    api: Arc<dyn WorkflowApi>,
    session: Arc<SessionState>,
    inner: Mutex<PortalState>,
    events: broadcast::Sender<PortalEvent>,
}

impl UserPortal {
    pub fn new(api: Arc<dyn WorkflowApi>, session: Arc<SessionState>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            api,
            session,
            inner: Mutex::new(PortalState::default()),
            events,
        })
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PortalEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> PortalSnapshot {
        let state = self.inner.lock().await;
        PortalSnapshot {
            active_case: state.active_case.clone(),
            step: state.tracker.state().clone(),
            gate: state.gate.state(),
            process_data: state.views.process_data().to_vec(),
            steps: state.views.steps().to_vec(),
            search_results: state.search_results.clone(),
            reference: state.reference.clone(),
        }
    }

    pub async fn gate(&self) -> GateState {
        self.inner.lock().await.gate.state()
    }

    pub async fn find_process_data(&self, process_data_no: ProcessDataNo) -> Option<ProcessData> {
        self.inner
            .lock()
            .await
            .views
            .find_process_data(process_data_no)
            .cloned()
    }

    fn emit(&self, event: PortalEvent) {
        let _ = self.events.send(event);
    }

    fn notify(&self, notice: Notice) {
        self.emit(PortalEvent::Notice(notice));
    }

    async fn surface(&self, context: ActionContext, epoch: u64, err: ClientError) -> ClientError {
        warn!(?context, kind = ?err.kind(), error = %err, "portal action failed");
        if err.requires_reauth() && self.session.invalidate(epoch).await {
            self.reset_state().await;
            self.emit(PortalEvent::SessionEnded);
        }
        self.notify(Notice::failure(context, &err));
        err
    }

    async fn guarded<T>(
        &self,
        context: ActionContext,
        epoch: u64,
        result: ClientResult<T>,
    ) -> ClientResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => Err(self.surface(context, epoch, err).await),
        }
    }

    async fn caller(&self) -> ClientResult<Caller> {
        self.session.caller().await.ok_or(ClientError::NoSession)
    }

    /// Publishes the tracker state and re-evaluates the gate in the same critical section.
    fn publish_tracker(&self, state: &mut PortalState) {
        let case_no = state.tracker.case_no();
        let step_state = state.tracker.state().clone();
        if let Some(case_no) = case_no {
            self.emit(PortalEvent::StepStateChanged {
                case_no,
                state: step_state.clone(),
            });
        }
        if let Some(gate) = state.gate.update(case_no, &step_state) {
            self.emit(PortalEvent::GateChanged(gate));
        }
    }

    async fn reset_state(&self) {
        let mut state = self.inner.lock().await;
        state.active_case = None;
        state.search_results.clear();
        state.reference = ReferenceData::default();
        state.tracker.reset();
        state.views.reset();
        self.publish_tracker(&mut state);
    }

    pub async fn login(&self, username: &str, password: &str) -> ClientResult<Session> {
        let epoch = self.session.epoch().await;
        let result = self.login_impl(username, password).await;
        self.guarded(ActionContext::Login, epoch, result).await
    }

    async fn login_impl(&self, username: &str, password: &str) -> ClientResult<Session> {
        require_credentials(username, password)?;
        self.session.clear().await;
        self.reset_state().await;

        let grant = self.api.request_token(username.trim(), password).await?;
        self.session.stage_token(grant.access_token.clone()).await;
        let profile = match self.api.current_user().await {
            Ok(profile) => profile,
            Err(err) => {
                self.session.clear().await;
                return Err(err);
            }
        };

        let session = Session {
            token: grant.access_token,
            username: profile.username,
            capabilities: Capabilities::from_server_role(&profile.role),
        };
        let epoch = self.session.begin(session.clone()).await;
        self.emit(PortalEvent::SessionStarted {
            username: session.username.clone(),
            capabilities: session.capabilities.clone(),
        });
        self.notify(Notice::success(ActionContext::Login, "Login successful"));

        if let Err(err) = self.load_reference_data_impl().await {
            self.surface(ActionContext::ReferenceData, epoch, err).await;
        }
        Ok(session)
    }

    /// Registers an account and signs in with it. The server decides the role.
    pub async fn register(&self, username: &str, password: &str) -> ClientResult<Session> {
        let epoch = self.session.epoch().await;
        let result = async {
            require_credentials(username, password)?;
            self.api
                .register(&RegisterRequest {
                    username: username.trim().to_string(),
                    password: password.to_string(),
                    role: "user".to_string(),
                })
                .await
        }
        .await;
        self.guarded(ActionContext::Register, epoch, result).await?;
        self.notify(Notice::success(
            ActionContext::Register,
            "Registration successful, logging in...",
        ));
        self.login(username, password).await
    }

    pub async fn logout(&self) {
        self.session.clear().await;
        self.reset_state().await;
        self.emit(PortalEvent::SessionEnded);
        self.notify(Notice::success(ActionContext::Logout, "Logged out"));
    }

    pub async fn load_reference_data(&self) -> ClientResult<ReferenceData> {
        let epoch = self.session.epoch().await;
        let result = self.load_reference_data_impl().await;
        self.guarded(ActionContext::ReferenceData, epoch, result).await
    }

    async fn load_reference_data_impl(&self) -> ClientResult<ReferenceData> {
        let (process_types, process_data_types) = futures::join!(
            self.api.list_process_types(),
            self.api.list_process_data_types()
        );
        let reference = ReferenceData {
            process_types: process_types?,
            process_data_types: process_data_types?,
        };
        self.inner.lock().await.reference = reference.clone();
        self.emit(PortalEvent::ReferenceDataLoaded(reference.clone()));
        Ok(reference)
    }

    pub async fn search(&self, query: &str) -> ClientResult<Vec<Case>> {
        let epoch = self.session.epoch().await;
        let result = self.search_impl(query).await;
        self.guarded(ActionContext::Search, epoch, result).await
    }

    async fn search_impl(&self, query: &str) -> ClientResult<Vec<Case>> {
        let caller = self.caller().await?;
        let results = selector::search(self.api.as_ref(), query, &caller).await?;
        info!(query = query.trim(), hits = results.len(), "case search completed");
        self.inner.lock().await.search_results = results.clone();
        self.emit(PortalEvent::SearchCompleted {
            query: query.trim().to_string(),
            results: results.clone(),
        });
        if results.is_empty() {
            self.notify(Notice::info(ActionContext::Search, "No matching cases found"));
        }
        Ok(results)
    }

    pub async fn select_case(&self, case: Case) -> ClientResult<()> {
        let epoch = self.session.epoch().await;
        let result = self.select_case_impl(case, epoch).await;
        self.guarded(ActionContext::SelectCase, epoch, result).await
    }

    /// Selects a case by number, preferring the last search results over a lookup.
    pub async fn select_case_no(&self, case_no: CaseNo) -> ClientResult<()> {
        let epoch = self.session.epoch().await;
        let result = async {
            let listed = self
                .inner
                .lock()
                .await
                .search_results
                .iter()
                .find(|case| case.caseno == case_no)
                .cloned();
            let case = match listed {
                Some(case) => case,
                None => self.api.get_case(case_no).await?,
            };
            self.select_case_impl(case, epoch).await
        }
        .await;
        self.guarded(ActionContext::SelectCase, epoch, result).await
    }

    async fn select_case_impl(&self, case: Case, epoch: u64) -> ClientResult<()> {
        let caller = self.caller().await?;
        selector::authorize_selection(&case, &caller)?;

        let case_no = case.caseno;
        let ticket = {
            let mut state = self.inner.lock().await;
            state.active_case = Some(case.clone());
            self.emit(PortalEvent::CaseSelected(case));
            let ticket = state.tracker.begin(case_no);
            self.publish_tracker(&mut state);
            ticket
        };
        info!(case_no = case_no.0, seq = ticket.seq, "case selected");

        let step = self.resolve_step(ticket).await;
        if let Err(err) = &step {
            if err.requires_reauth() {
                return step.map(|_| ());
            }
        }
        if self.inner.lock().await.active_case_no() != Some(case_no) {
            return Ok(());
        }
        self.render_views(epoch).await;
        step.map(|_| ())
    }

    pub async fn create_case(&self, input: NewCase) -> ClientResult<Case> {
        let epoch = self.session.epoch().await;
        let result = async {
            let caller = self.caller().await?;
            let (process_type_no, body) = input.validate(&caller.username)?;
            self.api.create_case(process_type_no, &body).await
        }
        .await;
        let created = self.guarded(ActionContext::CreateCase, epoch, result).await?;
        info!(case_no = created.caseno.0, "case created");
        self.notify(Notice::success(
            ActionContext::CreateCase,
            format!("Case #{} created", created.caseno),
        ));
        let _ = self.select_case(created.clone()).await;
        Ok(created)
    }

    /// Re-resolves the current step of the active case.
    pub async fn refresh_step(&self) -> ClientResult<StepState> {
        let epoch = self.session.epoch().await;
        let result = self.refresh_step_impl().await;
        self.guarded(ActionContext::RefreshStep, epoch, result).await
    }

    async fn refresh_step_impl(&self) -> ClientResult<StepState> {
        let ticket = {
            let mut state = self.inner.lock().await;
            let Some(case_no) = state.active_case_no() else {
                state.tracker.reset();
                self.publish_tracker(&mut state);
                return Ok(StepState::Idle);
            };
            let ticket = state.tracker.begin(case_no);
            self.publish_tracker(&mut state);
            ticket
        };
        self.resolve_step(ticket).await
    }

    /// Performs the lookup for `ticket` and settles it. A superseded ticket changes nothing
    /// and its failure is not reported, since it concerns a case no longer shown.
    async fn resolve_step(&self, ticket: RefreshTicket) -> ClientResult<StepState> {
        let (resolution, failure) = match self.api.current_step(ticket.case_no).await {
            Ok(step) => (Resolution::Open(step), None),
            Err(err) if err.is_not_found() => (Resolution::NoOpenStep, None),
            Err(err) => (Resolution::Failed, Some(err)),
        };

        let mut state = self.inner.lock().await;
        let settled = state.tracker.settle(ticket, resolution);
        match settled {
            Settled::Applied(settled) => {
                self.publish_tracker(&mut state);
                drop(state);
                match failure {
                    Some(err) => Err(err),
                    None => Ok(settled),
                }
            }
            Settled::Stale => Ok(state.tracker.state().clone()),
        }
    }

    /// Reloads the process-data list and step history of the active case.
    pub async fn refresh_views(&self) -> ClientResult<()> {
        let epoch = self.session.epoch().await;
        let result = self.refresh_views_impl().await;
        self.guarded(ActionContext::LoadViews, epoch, result).await
    }

    async fn render_views(&self, epoch: u64) {
        if let Err(err) = self.refresh_views_impl().await {
            self.surface(ActionContext::LoadViews, epoch, err).await;
        }
    }

    async fn refresh_views_impl(&self) -> ClientResult<()> {
        let ticket = {
            let mut state = self.inner.lock().await;
            let Some(case_no) = state.active_case_no() else {
                return Ok(());
            };
            state.views.begin(case_no)
        };

        let (process_data, steps) = futures::join!(
            self.api.case_process_data(ticket.case_no),
            self.api.case_steps(ticket.case_no)
        );

        let mut failure = None;
        let mut state = self.inner.lock().await;
        match process_data {
            Ok(items) => {
                if state.views.apply_process_data(ticket, items.clone()) {
                    self.emit(PortalEvent::ProcessDataListed {
                        case_no: ticket.case_no,
                        items,
                    });
                }
            }
            Err(err) => failure = Some(err),
        }
        match steps {
            Ok(steps) => {
                if state.views.apply_steps(ticket, steps.clone()) {
                    self.emit(PortalEvent::StepHistoryListed {
                        case_no: ticket.case_no,
                        steps,
                    });
                }
            }
            Err(err) if failure.is_some() => {
                warn!(case_no = ticket.case_no.0, error = %err, "step history failed to load");
            }
            Err(err) => failure = Some(err),
        }
        let current = state.views.is_current(ticket);
        drop(state);

        match failure {
            Some(err) if current => Err(err),
            _ => Ok(()),
        }
    }

    pub async fn add_process_data(&self, input: ProcessDataInput) -> ClientResult<ProcessData> {
        let epoch = self.session.epoch().await;
        let result = async {
            let body = input.validate()?;
            let (case_no, process_no) = self.inner.lock().await.gate.authorize()?;
            info!(case_no = case_no.0, process_no = process_no.0, field = %body.fieldname, "adding process data");
            self.api.add_process_data(process_no, &body).await
        }
        .await;
        let created = self
            .guarded(ActionContext::AddProcessData, epoch, result)
            .await?;
        self.notify(Notice::success(
            ActionContext::AddProcessData,
            "Process data added",
        ));
        self.render_views(epoch).await;
        Ok(created)
    }

    pub async fn update_process_data(
        &self,
        process_data_no: ProcessDataNo,
        input: ProcessDataInput,
    ) -> ClientResult<ProcessData> {
        let epoch = self.session.epoch().await;
        let result = async {
            let body = input.validate()?;
            let (case_no, _) = self.inner.lock().await.gate.authorize()?;
            info!(case_no = case_no.0, process_data_no = process_data_no.0, "updating process data");
            self.api.update_process_data(process_data_no, &body).await
        }
        .await;
        let updated = self
            .guarded(ActionContext::UpdateProcessData, epoch, result)
            .await?;
        self.notify(Notice::success(
            ActionContext::UpdateProcessData,
            "Process data updated",
        ));
        self.render_views(epoch).await;
        Ok(updated)
    }

    /// Closes the open step with empty rule data.
    pub async fn close_step(&self) -> ClientResult<StepState> {
        self.close_step_with(CloseStepRequest::default()).await
    }

    /// Closes the open step, then re-resolves the case before the views are reloaded.
    /// The server decides whether a new step opens.
    pub async fn close_step_with(&self, request: CloseStepRequest) -> ClientResult<StepState> {
        let epoch = self.session.epoch().await;
        let result = self.close_step_impl(request, epoch).await;
        self.guarded(ActionContext::CloseStep, epoch, result).await
    }

    async fn close_step_impl(
        &self,
        request: CloseStepRequest,
        epoch: u64,
    ) -> ClientResult<StepState> {
        let (case_no, step_no) = {
            let state = self.inner.lock().await;
            match (state.active_case_no(), state.tracker.state()) {
                (None, _) => return Err(ClientError::GateClosed(GateBlock::NoCase)),
                (Some(case_no), StepState::Busy(step)) => (case_no, step.stepno),
                (Some(_), _) => return Err(ClientError::NoOpenStep),
            }
        };

        info!(case_no = case_no.0, step_no = step_no.0, "closing step");
        self.api.close_step(step_no, &request).await?;
        self.notify(Notice::success(
            ActionContext::CloseStep,
            format!("Step #{step_no} closed"),
        ));

        let ticket = {
            let mut state = self.inner.lock().await;
            if state.tracker.case_no() != Some(case_no) {
                return Ok(state.tracker.state().clone());
            }
            let Some(ticket) = state.tracker.begin_after_close() else {
                return Ok(StepState::Idle);
            };
            self.publish_tracker(&mut state);
            ticket
        };

        let settled = self.resolve_step(ticket).await;
        self.render_views(epoch).await;
        settled
    }
}

#[cfg(test)]
#[path = "tests/portal_tests.rs"]
mod tests;
