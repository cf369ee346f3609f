//! Tool runtime: a `Tool` trait and name-keyed registry, extended with
//! declarative email/SQL/REST tool kinds and the permission/rate-limit/
//! execution-record bookkeeping a multi-tenant hub needs.

mod error;
pub mod registry;
pub mod specs;
mod traits;

pub use error::ToolError;
pub use registry::{DispatchOutcome, ToolKind, ToolRegistry};
pub use specs::{EmailToolSpec, HttpMethod, RestToolSpec, SqlDatabaseType, SqlToolSpec};
pub use traits::{optional_string, require_string, Tool};
