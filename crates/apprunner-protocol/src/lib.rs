//! Application runtime contract.
//!
//! Embedded mini-application pages talk to their backend counterpart through
//! four operations:
//!
//! | Operation | Shape | Route |
//! |---|---|---|
//! | resolve a page | unary | `/jungletv.ApplicationRuntime/ResolveApplicationPage` |
//! | consume the page event stream | server streaming | `/jungletv.ApplicationRuntime/ConsumeApplicationEvents` |
//! | invoke a server method | unary | `/jungletv.ApplicationRuntime/ApplicationServerMethod` |
//! | trigger an application event | unary | `/jungletv.ApplicationRuntime/TriggerApplicationEvent` |
//!
//! [`proto`] holds the wire messages and the generated tonic client/server
//! modules; the crate root re-exports the domain types used by the runner.

pub mod proto;
mod types;

pub use types::{
    ApplicationEvent, EventTrigger, MethodInvocation, MethodResult, PageRef, ProtocolError,
    ResolvedPage, StreamUpdate, datetime_from_timestamp, timestamp_from_datetime,
};

pub use proto::application_runtime_client::ApplicationRuntimeClient;
pub use proto::application_runtime_server::{ApplicationRuntime, ApplicationRuntimeServer};
