//! Case search and selection authorization.

use shared::{domain::CaseNo, protocol::Case};
use tracing::debug;

use crate::{
    error::{ClientError, ClientResult},
    session::Caller,
    WorkflowApi,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Purely numeric input: tried as a case number first. `text` keeps the input for
    /// the client-id fallback.
    CaseNumber { case_no: CaseNo, text: String },
    ClientId(String),
}

impl SearchQuery {
    pub fn parse(raw: &str) -> ClientResult<Self> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(ClientError::validation("search query must not be empty"));
        }
        if text.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(number) = text.parse::<i64>() {
                return Ok(Self::CaseNumber {
                    case_no: CaseNo(number),
                    text: text.to_string(),
                });
            }
        }
        Ok(Self::ClientId(text.to_string()))
    }

    fn text(&self) -> &str {
        match self {
            Self::CaseNumber { text, .. } | Self::ClientId(text) => text,
        }
    }
}

/// Resolves `raw` to the cases `caller` may see, in server order.
///
/// A numeric query that hits a visible case directly returns that case alone, even if
/// the same digits also occur in other client identifiers.
pub async fn search(api: &dyn WorkflowApi, raw: &str, caller: &Caller) -> ClientResult<Vec<Case>> {
    let query = SearchQuery::parse(raw)?;

    if let SearchQuery::CaseNumber { case_no, .. } = &query {
        match api.get_case(*case_no).await {
            Ok(case) if caller.may_see(&case) => {
                debug!(case_no = case_no.0, "search resolved by case number");
                return Ok(vec![case]);
            }
            Ok(_) => {
                debug!(case_no = case_no.0, "case number hit is not visible to caller, falling back");
            }
            Err(err) if err.requires_reauth() => return Err(err),
            Err(err) => {
                debug!(case_no = case_no.0, error = %err, "case number lookup failed, falling back");
            }
        }
    }

    let cases = api.list_cases().await?;
    Ok(match_client_id(cases, query.text(), caller))
}

/// Case-insensitive substring match on the client identifier, restricted to cases the
/// caller may see regardless of what the server returned.
pub fn match_client_id(cases: Vec<Case>, needle: &str, caller: &Caller) -> Vec<Case> {
    let needle = needle.to_lowercase();
    cases
        .into_iter()
        .filter(|case| caller.may_see(case))
        .filter(|case| case.client_id.to_lowercase().contains(&needle))
        .collect()
}

pub fn authorize_selection(case: &Case, caller: &Caller) -> ClientResult<()> {
    if caller.may_see(case) {
        Ok(())
    } else {
        Err(ClientError::CaseNotOwned {
            case_no: case.caseno,
        })
    }
}

#[cfg(test)]
#[path = "tests/selector_tests.rs"]
mod tests;
