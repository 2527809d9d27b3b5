//! Wire and domain types shared between the portal client and its console.

pub mod domain;
pub mod error;
pub mod protocol;
