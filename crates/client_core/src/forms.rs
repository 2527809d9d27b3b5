//! Form inputs checked before anything is sent.

use shared::{
    domain::{ProcessDataTypeNo, ProcessTypeNo},
    protocol::{CreateCaseRequest, ProcessDataWrite},
};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessDataInput {
    pub process_data_type_no: Option<ProcessDataTypeNo>,
    pub fieldname: String,
    pub value: String,
}

impl ProcessDataInput {
    pub fn new(
        process_data_type_no: ProcessDataTypeNo,
        fieldname: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            process_data_type_no: Some(process_data_type_no),
            fieldname: fieldname.into(),
            value: value.into(),
        }
    }

    /// The value may be empty; type and field name may not.
    pub fn validate(&self) -> ClientResult<ProcessDataWrite> {
        let fieldname = self.fieldname.trim();
        let (Some(process_data_type_no), false) = (self.process_data_type_no, fieldname.is_empty())
        else {
            return Err(ClientError::validation(
                "please provide process data type and field",
            ));
        };
        Ok(ProcessDataWrite {
            process_data_type_no,
            fieldname: fieldname.to_string(),
            value: self.value.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCase {
    pub process_type_no: Option<ProcessTypeNo>,
    pub client_id: String,
    pub client_type: String,
}

impl NewCase {
    pub fn validate(&self, owner: &str) -> ClientResult<(ProcessTypeNo, CreateCaseRequest)> {
        let client_id = self.client_id.trim();
        let client_type = self.client_type.trim();
        match self.process_type_no {
            Some(process_type_no) if !client_id.is_empty() && !client_type.is_empty() => Ok((
                process_type_no,
                CreateCaseRequest {
                    client_id: client_id.to_string(),
                    client_type: client_type.to_string(),
                    usrid: owner.to_string(),
                },
            )),
            _ => Err(ClientError::validation("please complete all fields")),
        }
    }
}

pub(crate) fn require_credentials(username: &str, password: &str) -> ClientResult<()> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(ClientError::validation("username and password are required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_data_requires_type_and_field() {
        let missing_type = ProcessDataInput {
            process_data_type_no: None,
            fieldname: "amount".into(),
            value: "100".into(),
        };
        assert!(matches!(
            missing_type.validate(),
            Err(ClientError::Validation(_))
        ));

        let blank_field = ProcessDataInput::new(ProcessDataTypeNo(1), "   ", "100");
        assert!(blank_field.validate().is_err());

        let body = ProcessDataInput::new(ProcessDataTypeNo(1), " amount ", "")
            .validate()
            .expect("valid");
        assert_eq!(body.fieldname, "amount");
        assert_eq!(body.value, "");
    }

    #[test]
    fn new_case_is_owned_by_caller() {
        let input = NewCase {
            process_type_no: Some(ProcessTypeNo(2)),
            client_id: " ACME-7 ".into(),
            client_type: "company".into(),
        };
        let (ptype, body) = input.validate("alice").expect("valid");
        assert_eq!(ptype, ProcessTypeNo(2));
        assert_eq!(body.client_id, "ACME-7");
        assert_eq!(body.usrid, "alice");

        let incomplete = NewCase {
            client_type: String::new(),
            ..input
        };
        assert!(incomplete.validate("alice").is_err());
    }

    #[test]
    fn credentials_must_be_present() {
        assert!(require_credentials("alice", "secret").is_ok());
        assert!(require_credentials(" ", "secret").is_err());
        assert!(require_credentials("alice", "").is_err());
    }
}
