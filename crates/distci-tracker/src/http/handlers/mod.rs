//! HTTP request handlers.

mod health;
mod response;
mod rpc;
mod work;

pub use health::{health_check, metrics_handler};
pub use response::{post_dispatch_failure, post_error, post_result};
pub use rpc::{announce, remove};
pub use work::{submit_work, work_results};
