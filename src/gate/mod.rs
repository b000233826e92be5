//! # Gate Module
//!
//! Operation-gated dispatch between the MCP transport and the wallet backend.
//!
//! - `catalog` - fixed table of wallet operations and their categories
//! - `policy` - capability and confirmation policy, and the gate itself
//! - `confirmation` - table of mutating calls awaiting approval
//! - `dispatcher` - ties the above together for each invocation
//! - `models` - request, result and confirmation types

pub mod catalog;
pub mod confirmation;
pub mod dispatcher;
pub mod models;
pub mod policy;

pub use catalog::{Catalog, CatalogError, OperationDescriptor};
pub use confirmation::{ConfirmationBroker, ConfirmationError, Resolution};
pub use dispatcher::Dispatcher;
pub use models::{
    Arguments, Decision, ErrorKind, InvocationRequest, InvocationResult, OperationCategory,
    PendingConfirmation, RejectReason,
};
pub use policy::{evaluate, DisconnectPolicy, GateDecision, ServerPolicy};
