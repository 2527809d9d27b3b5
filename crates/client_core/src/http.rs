//! `reqwest` implementation of [`WorkflowApi`].

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{CaseNo, ProcessDataNo, ProcessNo, ProcessTypeNo, StepNo},
    error::ApiError,
    protocol::{
        Case, CloseStepRequest, CreateCaseQuery, CreateCaseRequest, ProcessData, ProcessDataType,
        ProcessDataWrite, ProcessType, RegisterRequest, Step, TokenResponse, UserProfile,
    },
};
use tracing::debug;
use url::Url;

use crate::{
    error::{ClientError, ClientResult},
    session::SessionState,
    WorkflowApi,
};

pub struct HttpWorkflowApi {
    http: Client,
    server_url: String,
    session: Arc<SessionState>,
}

impl HttpWorkflowApi {
    pub fn new(server_url: &str, session: Arc<SessionState>) -> ClientResult<Self> {
        Self::with_timeout(server_url, session, None)
    }

    /// Without a timeout the transport default applies and a hung request stays pending
    /// until the connection fails.
    pub fn with_timeout(
        server_url: &str,
        session: Arc<SessionState>,
        timeout: Option<Duration>,
    ) -> ClientResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            server_url: normalize_server_url(server_url)?,
            session,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server_url)
    }

    async fn bearer(&self) -> ClientResult<String> {
        self.session.token().await.ok_or(ClientError::NoSession)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let token = self.bearer().await?;
        debug!(method = "GET", path, "dispatching request");
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await?;
        decode(response).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let token = self.bearer().await?;
        debug!(method = %method, path, "dispatching request");
        let response = self
            .http
            .request(method, self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }
}

fn normalize_server_url(raw: &str) -> ClientResult<String> {
    let parsed = Url::parse(raw.trim())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::validation(
            "server_url must start with http:// or https://",
        ));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

async fn reject(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ClientError::Api(ApiError::from_response(status, &body).into())
}

async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    if !response.status().is_success() {
        return Err(reject(response).await);
    }
    Ok(response.json().await?)
}

async fn expect_success(response: Response) -> ClientResult<()> {
    if !response.status().is_success() {
        return Err(reject(response).await);
    }
    Ok(())
}

#[async_trait]
impl WorkflowApi for HttpWorkflowApi {
    async fn request_token(&self, username: &str, password: &str) -> ClientResult<TokenResponse> {
        debug!(method = "POST", path = "/auth/token", "dispatching request");
        let response = self
            .http
            .post(self.url("/auth/token"))
            .form(&[
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
            ])
            .send()
            .await?;
        decode(response).await
    }

    async fn current_user(&self) -> ClientResult<UserProfile> {
        self.get_json("/auth/me").await
    }

    async fn register(&self, request: &RegisterRequest) -> ClientResult<UserProfile> {
        debug!(method = "POST", path = "/auth/register", "dispatching request");
        let mut builder = self.http.post(self.url("/auth/register")).json(request);
        if let Some(token) = self.session.token().await {
            builder = builder.bearer_auth(token);
        }
        decode(builder.send().await?).await
    }

    async fn list_cases(&self) -> ClientResult<Vec<Case>> {
        self.get_json("/cases").await
    }

    async fn get_case(&self, case_no: CaseNo) -> ClientResult<Case> {
        self.get_json(&format!("/cases/{}", case_no.0)).await
    }

    async fn current_step(&self, case_no: CaseNo) -> ClientResult<Step> {
        self.get_json(&format!("/cases/{}/current-step", case_no.0))
            .await
    }

    async fn case_process_data(&self, case_no: CaseNo) -> ClientResult<Vec<ProcessData>> {
        self.get_json(&format!("/cases/{}/process-data", case_no.0))
            .await
    }

    async fn case_steps(&self, case_no: CaseNo) -> ClientResult<Vec<Step>> {
        self.get_json(&format!("/cases/{}/steps", case_no.0)).await
    }

    async fn add_process_data(
        &self,
        process_no: ProcessNo,
        body: &ProcessDataWrite,
    ) -> ClientResult<ProcessData> {
        self.send_json(
            Method::POST,
            &format!("/processes/{}/data/", process_no.0),
            body,
        )
        .await
    }

    async fn update_process_data(
        &self,
        process_data_no: ProcessDataNo,
        body: &ProcessDataWrite,
    ) -> ClientResult<ProcessData> {
        self.send_json(
            Method::PUT,
            &format!("/process-data/{}", process_data_no.0),
            body,
        )
        .await
    }

    async fn close_step(&self, step_no: StepNo, body: &CloseStepRequest) -> ClientResult<()> {
        let token = self.bearer().await?;
        let path = format!("/steps/{}/close", step_no.0);
        debug!(method = "POST", path = %path, "dispatching request");
        let response = self
            .http
            .post(self.url(&path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        expect_success(response).await
    }

    async fn create_case(
        &self,
        process_type_no: ProcessTypeNo,
        body: &CreateCaseRequest,
    ) -> ClientResult<Case> {
        let token = self.bearer().await?;
        debug!(method = "POST", path = "/create-case/", process_type_no = process_type_no.0, "dispatching request");
        let response = self
            .http
            .post(self.url("/create-case/"))
            .query(&CreateCaseQuery { process_type_no })
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    async fn list_process_types(&self) -> ClientResult<Vec<ProcessType>> {
        self.get_json("/process-types").await
    }

    async fn list_process_data_types(&self) -> ClientResult<Vec<ProcessDataType>> {
        self.get_json("/process-data-types").await
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
