//! HTTP-mode conversation: history plus the function-dispatch orchestrator
//!
//! One [`ConversationOrchestrator`] drives one logical conversation. Callers
//! needing concurrent conversations use separate instances.

mod orchestrator;
mod state;

pub use orchestrator::{ConversationOrchestrator, FunctionCallOutcome};
pub use state::{ActiveProvider, ConversationState, HistoryPolicy};
