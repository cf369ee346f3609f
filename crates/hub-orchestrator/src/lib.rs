pub mod context_manager;
pub mod error;
pub mod flow_router;
pub mod orchestrator;

pub use context_manager::{ContextManager, SessionContext};
pub use error::OrchestratorError;
pub use flow_router::{FlowRouter, ResolvedRouting};
pub use orchestrator::{Orchestrator, ProcessingResult};
