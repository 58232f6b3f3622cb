//! Core of the ModelOps gateway: a tool-calling conversation loop in front of a
//! cloud resource-management service.
//!
//! A user talks to a language model; the model autonomously invokes a fixed set
//! of administrative tools against the remote service (enumerating deployed model
//! instances, checking retirement status, updating deployment configuration and
//! reading quota usage) for as many rounds as it needs before producing a final
//! natural-language answer.
//!
//! # Architecture Overview
//!
//! - **Conversation orchestration**: bounded, cancellable tool-calling loop with a
//!   streaming variant ([`orchestrator`])
//! - **Language model integration**: provider-agnostic [`LLM`] trait with an
//!   OpenAI / Azure OpenAI chat-completions client ([`llm`])
//! - **Tool ecosystem**: closed, compile-time checked tool dispatch table ([`tools`])
//! - **Resource management**: the remote collaborator boundary and its Azure
//!   Resource Manager client ([`management`])
//! - **Configuration system**: YAML or environment driven configuration ([`config`])

pub mod config;
pub mod core_types;
pub mod errors;
pub mod factory;
pub mod llm;
pub mod management;
pub mod orchestrator;
pub mod tools;

pub use config::*;
pub use core_types::{ChatEvent, Message, Role};
pub use errors::{AgentError, FailureKind};
pub use factory::GatewayFactory;
pub use llm::LLM;
pub use management::{ManagementError, ResourceManager};
pub use orchestrator::{ChatEventStream, Orchestrator, OrchestratorConfig};
pub use tools::ToolDispatcher;

#[cfg(test)]
pub mod test_utils;
