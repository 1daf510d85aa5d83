//! Query answering: plain chat and retrieval-augmented chat.

mod orchestrator;
mod prompts;

pub use orchestrator::{Answer, ChatMode, QueryOrchestrator};
pub use prompts::context_prompt;
