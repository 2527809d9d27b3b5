use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CaseNo, ProcessDataNo, ProcessDataTypeNo, ProcessNo, ProcessTypeNo, StatusNo, StepNo, TaskNo,
};

/// Timestamp decoding shared by the wire types.
///
/// The workflow API emits naive ISO-8601 values (no offset) for most columns, while
/// proxies and newer deployments may add an offset. Both are normalized to UTC.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub caseno: CaseNo,
    pub client_id: String,
    pub client_type: String,
    pub usrid: String,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_created: Option<DateTime<Utc>>,
}

impl Case {
    pub fn is_owned_by(&self, username: &str) -> bool {
        self.usrid == username
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub stepno: StepNo,
    pub processno: ProcessNo,
    pub taskno: TaskNo,
    pub status_no: StatusNo,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub date_started: DateTime<Utc>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_ended: Option<DateTime<Utc>>,
}

impl Step {
    /// A step is open while it has no end timestamp.
    pub fn is_open(&self) -> bool {
        self.date_ended.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessData {
    pub process_data_no: ProcessDataNo,
    pub processno: ProcessNo,
    pub process_data_type_no: ProcessDataTypeNo,
    pub fieldname: String,
    #[serde(default)]
    pub value: String,
}

/// Body for both creating and updating a process-data item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDataWrite {
    pub process_data_type_no: ProcessDataTypeNo,
    pub fieldname: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloseStepRequest {
    #[serde(default)]
    pub rule_data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCaseRequest {
    pub client_id: String,
    pub client_type: String,
    pub usrid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCaseQuery {
    pub process_type_no: ProcessTypeNo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    /// Ignored by the server beyond validation; the first account becomes admin.
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessType {
    pub process_type_no: ProcessTypeNo,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDataType {
    pub process_data_type_no: ProcessDataTypeNo,
    pub description: String,
}
