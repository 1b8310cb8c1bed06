//! CLI commands for batch order placement.

pub mod create_sample;
pub mod execute;
pub mod list_accounts;
pub mod token_status;

pub use create_sample::{run_create_sample, CreateSampleArgs};
pub use execute::{run_execute, ExecuteArgs};
pub use list_accounts::run_list_accounts;
pub use token_status::run_token_status;
