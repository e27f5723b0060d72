//! Dispatch protocol shared by the Tracker, Builders and Runners.
//!
//! Every message that crosses a process boundary is defined in
//! [`messages`]; every error that crosses one is an [`RpcError`].

pub mod client;
pub mod error;
pub mod messages;
pub mod registry;
pub mod routes;

pub use client::{ClientError, RpcClient};
pub use error::{IntoRpc, RpcError};
pub use registry::Registration;
pub use messages::{
    AnnounceArgs, AnnounceReply, BuilderResponse, BuilderTask, DispatchResponse, Empty,
    RemoveArgs, RunTest, RunnerResponse, RunnerTask,
};
