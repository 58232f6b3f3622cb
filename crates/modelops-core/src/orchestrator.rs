//! Conversation orchestration.
//!
//! Each request runs the tool-calling loop: send the conversation and the tool
//! registry to the model, execute any tool calls it asks for in order, append
//! their results and go again until the model answers without tool calls.
//! The loop is bounded by a round limit and an optional wall-clock budget, and
//! every suspension point observes a [`CancellationToken`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core_types::{ChatEvent, Message, Role};
use crate::errors::AgentError;
use crate::llm::{ToolMetadata, LLM};
use crate::tools::ToolDispatcher;

pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_rounds: usize,
    pub time_budget: Option<Duration>,
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            time_budget: Some(Duration::from_secs(120)),
            system_prompt: None,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    llm: Arc<dyn LLM>,
    tools: Arc<ToolDispatcher>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LLM>, tools: Arc<ToolDispatcher>, config: OrchestratorConfig) -> Self {
        Self { llm, tools, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Vec<ToolMetadata> {
        self.tools.capabilities()
    }

    fn prepare(&self, mut messages: Vec<Message>) -> Vec<Message> {
        if let Some(prompt) = &self.config.system_prompt {
            if !messages.iter().any(|m| m.role == Role::System) {
                messages.insert(0, Message::system(prompt.clone()));
            }
        }
        messages
    }

    pub async fn run(&self, messages: Vec<Message>) -> Result<Message, AgentError> {
        self.run_with_cancel(messages, CancellationToken::new()).await
    }

    pub async fn run_with_cancel(
        &self,
        messages: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<Message, AgentError> {
        if let Some(last) = messages.last() {
            log::info!("User asks: {}", last.text());
        }
        self.drive(self.prepare(messages), &cancel, None).await
    }

    /// Streaming variant. The loop runs on its own task; dropping the returned
    /// stream cancels it.
    pub fn run_stream(&self, messages: Vec<Message>) -> ChatEventStream {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = self.clone();
        let conversation = self.prepare(messages);
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let terminal = match orchestrator.drive(conversation, &task_cancel, Some(&tx)).await {
                Ok(message) => ChatEvent::Final(message),
                Err(e) => {
                    log::error!("Streaming conversation failed: {}", e);
                    ChatEvent::Error(e.to_string())
                }
            };
            let _ = tx.send(terminal);
        });

        let cancel_on_drop = cancel.drop_guard();
        Box::pin(async_stream::stream! {
            let _cancel_on_drop = cancel_on_drop;
            while let Some(event) = rx.recv().await {
                let terminal = event.is_terminal();
                yield event;
                if terminal {
                    break;
                }
            }
        })
    }

    async fn drive(
        &self,
        mut conversation: Vec<Message>,
        cancel: &CancellationToken,
        events: Option<&mpsc::UnboundedSender<ChatEvent>>,
    ) -> Result<Message, AgentError> {
        let deadline = self.config.time_budget.map(|budget| Instant::now() + budget);
        let tools = self.tools.capabilities();

        for round in 1..=self.config.max_rounds {
            log::info!("Model round {}/{}", round, self.config.max_rounds);
            let response = guard(
                cancel,
                deadline,
                self.llm.generate(conversation.clone(), Some(tools.clone())),
            )
            .await??;

            let calls = match response.requested_tool_calls() {
                Some(calls) => calls.to_vec(),
                None => {
                    let content = response.content.clone().unwrap_or_default();
                    log::info!("LLM response after {} rounds: {}", round, content);
                    return Ok(Message::assistant(content));
                }
            };

            log::info!(
                "LLM requested tools: {}",
                calls
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            conversation.push(Message::assistant_tool_calls(
                response.content.clone(),
                calls.clone(),
            ));

            for call in calls {
                emit(
                    events,
                    ChatEvent::ToolCall {
                        name: call.name.clone(),
                    },
                );
                // The deadline never interrupts a running tool; batch items it
                // has not reached are reported as skipped.
                let result = guard(
                    cancel,
                    None,
                    self.tools.dispatch_until(&call.name, call.arguments, deadline),
                )
                .await??;
                let content = result.to_string();
                emit(
                    events,
                    ChatEvent::ToolUpdate {
                        content: content.clone(),
                    },
                );
                conversation.push(Message::tool_result(call.id, content));
            }
        }

        log::warn!(
            "Conversation reached max_rounds ({}) without a final answer",
            self.config.max_rounds
        );
        Err(AgentError::RoundsExhausted {
            max_rounds: self.config.max_rounds,
        })
    }
}

fn emit(events: Option<&mpsc::UnboundedSender<ChatEvent>>, event: ChatEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Await `fut` unless the token fires or the deadline passes first.
async fn guard<F: Future>(
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    fut: F,
) -> Result<F::Output, AgentError> {
    let expired = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        _ = expired => Err(AgentError::DeadlineExceeded),
        output = fut => Ok(output),
    }
}
