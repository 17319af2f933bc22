pub mod error;
pub mod invoker;
pub mod types;

pub use error::{AgentError, Result};
pub use invoker::{AgentInvoker, EchoAgentInvoker};
pub use types::{AgentRequest, AgentResponse, ToolEvent};
