//! CLI command implementations.

pub mod reset_ledger;
pub mod run;
pub mod status;
pub mod unlock;
