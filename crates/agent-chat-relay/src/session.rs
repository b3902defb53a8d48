use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::agent::{AgentCall, AgentRequest, EventCallback, FieldBag};
use crate::config::{ChatSettings, RelayConfig};
use crate::errors::{CallFailure, RelayError, call_failure_from_tool_error};
use crate::queue::StatusQueue;
use crate::relay::{CallOperation, Relay};
use crate::reporter::StatusReporter;
use crate::stream::SnapshotStream;
use crate::tools::{SharedToolProvider, ToolScope, ToolSpec};

/// Entry point for relaying prompts to an agent.
///
/// A session holds only immutable collaborators. Every call to
/// [`ChatSession::relay`] builds its own queue, reporter, worker and relay
/// state, so concurrent calls never share status.
#[derive(Clone)]
pub struct ChatSession {
    agent: Arc<dyn AgentCall>,
    tools: Option<SharedToolProvider>,
    settings: ChatSettings,
}

impl ChatSession {
    /// Starts a builder for configuring a session.
    pub fn builder() -> ChatSessionBuilder {
        ChatSessionBuilder::default()
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn relay_config(&self) -> &RelayConfig {
        &self.settings.relay
    }

    /// Prepares a relay for `prompt`. Nothing runs until it is iterated.
    pub fn relay(&self, prompt: impl Into<String>) -> Result<Relay, RelayError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(RelayError::Validation("prompt must not be empty".into()));
        }

        let call_id = uuid::Uuid::new_v4();
        let config = self.settings.relay.clone();
        let queue = StatusQueue::new();
        let reporter = StatusReporter::new(call_id, queue.sink(), config.preview_chars);
        let tools_used = reporter.tools_handle();
        debug!(call_id = %call_id, prompt = %crate::reporter::preview(&prompt, config.preview_chars), "relay prepared");

        let operation = call_operation(
            self.agent.clone(),
            self.tools.clone(),
            AgentRequest {
                call_id,
                prompt,
                tools: Vec::new(),
            },
            reporter,
        );
        Ok(Relay::new(call_id, config, queue, tools_used, operation))
    }

    /// Prepares a relay for `prompt` and drives it on the current tokio
    /// runtime's blocking pool.
    pub fn relay_stream(&self, prompt: impl Into<String>) -> Result<SnapshotStream, RelayError> {
        let runtime = Handle::try_current().map_err(|err| {
            RelayError::Config(format!("relay_stream must be called inside a tokio runtime: {err}"))
        })?;
        let relay = self.relay(prompt)?;
        Ok(SnapshotStream::spawn(
            relay,
            self.settings.relay.stream_buffer_capacity,
            &runtime,
        ))
    }

    /// Runs a call to completion and returns the text of its final snapshot.
    pub fn chat(&self, prompt: impl Into<String>) -> String {
        match self.relay(prompt) {
            Ok(relay) => relay
                .last()
                .map(|snapshot| snapshot.into_text())
                .unwrap_or_default(),
            Err(err) => format!("Sorry, an error occurred: {err}"),
        }
    }

    /// Human-readable summary of the configured model.
    pub fn model_info(&self) -> String {
        let mut info = self.settings.model_summary();
        info.push_str(&format!("agent: {}\n", self.agent.name()));
        if let Some(tools) = &self.tools {
            let name = match tools.lock() {
                Ok(provider) => provider.name().to_string(),
                Err(poisoned) => poisoned.into_inner().name().to_string(),
            };
            info.push_str(&format!("tool server: {name}\n"));
        }
        info
    }
}

fn call_operation(
    agent: Arc<dyn AgentCall>,
    tools: Option<SharedToolProvider>,
    mut request: AgentRequest,
    reporter: StatusReporter,
) -> CallOperation {
    Box::new(move || {
        let on_event = |fields: &FieldBag| reporter.report(fields);
        let Some(tools) = tools else {
            return invoke(agent.as_ref(), &request, &on_event);
        };

        // Held for the whole call: one call per provider instance at a time.
        let mut provider = match tools.lock() {
            Ok(provider) => provider,
            Err(poisoned) => poisoned.into_inner(),
        };
        let provider_name = provider.name().to_string();
        let mut scope = ToolScope::enter(provider.as_mut())
            .map_err(|err| call_failure_from_tool_error(&provider_name, &err))?;
        request.tools = scope
            .list_tools()
            .map_err(|err| call_failure_from_tool_error(&provider_name, &err))?;
        info!(
            call_id = %request.call_id,
            provider = %provider_name,
            tools = %tool_names(&request.tools),
            "tools discovered"
        );
        invoke(agent.as_ref(), &request, &on_event)
    })
}

fn invoke(
    agent: &dyn AgentCall,
    request: &AgentRequest,
    on_event: &EventCallback<'_>,
) -> Result<String, CallFailure> {
    agent
        .invoke(request, on_event)
        .map(|reply| reply.into_text())
        .map_err(CallFailure::from)
}

fn tool_names(tools: &[ToolSpec]) -> String {
    tools
        .iter()
        .map(|tool| tool.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Builder for [`ChatSession`].
#[derive(Default)]
pub struct ChatSessionBuilder {
    agent: Option<Arc<dyn AgentCall>>,
    tools: Option<SharedToolProvider>,
    settings: Option<ChatSettings>,
    relay: Option<RelayConfig>,
}

impl ChatSessionBuilder {
    /// Sets the agent every call is forwarded to. Required.
    pub fn agent(mut self, agent: Arc<dyn AgentCall>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Sets the tool provider entered around every call.
    pub fn tool_provider(mut self, provider: SharedToolProvider) -> Self {
        self.tools = Some(provider);
        self
    }

    pub fn settings(mut self, settings: ChatSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Overrides the relay knobs of the settings.
    pub fn relay_config(mut self, config: RelayConfig) -> Self {
        self.relay = Some(config);
        self
    }

    /// Builds the session; fails when no agent was configured.
    pub fn build(self) -> Result<ChatSession, RelayError> {
        let Some(agent) = self.agent else {
            return Err(RelayError::Config(
                "no agent configured; the session cannot start".into(),
            ));
        };
        let mut settings = self.settings.unwrap_or_default();
        if let Some(relay) = self.relay {
            settings.relay = relay;
        }
        settings.relay.validate()?;
        Ok(ChatSession {
            agent,
            tools: self.tools,
            settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentReply;
    use crate::errors::AgentError;
    use crate::relay::Snapshot;
    use crate::scripted::{ScriptReply, ScriptedAgent};
    use crate::tools::testing::StaticToolProvider;
    use crate::tools::{ToolSpec, shared};
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    /// Agent that records the requests it receives.
    #[derive(Default)]
    struct RecordingAgent {
        requests: Mutex<Vec<AgentRequest>>,
        delay: Duration,
    }

    impl AgentCall for RecordingAgent {
        fn invoke(
            &self,
            request: &AgentRequest,
            on_event: &EventCallback<'_>,
        ) -> Result<AgentReply, AgentError> {
            self.requests.lock().expect("lock").push(request.clone());
            let fields = serde_json::json!({"current_tool_use": {"name": "search"}});
            on_event(fields.as_object().expect("object"));
            std::thread::sleep(self.delay);
            Ok(AgentReply::Text(format!("answer to {}", request.prompt)))
        }
    }

    fn fast() -> RelayConfig {
        RelayConfig::default().poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn build_requires_an_agent() {
        let result = ChatSession::builder().build();
        assert!(
            matches!(result, Err(RelayError::Config(message)) if message.contains("no agent"))
        );
    }

    #[test]
    fn build_rejects_invalid_relay_config() {
        let result = ChatSession::builder()
            .agent(Arc::new(RecordingAgent::default()))
            .relay_config(RelayConfig::default().preview_chars(0))
            .build();
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn blank_prompt_is_rejected_before_start() {
        let session = ChatSession::builder()
            .agent(Arc::new(RecordingAgent::default()))
            .build()
            .expect("session");
        assert!(matches!(
            session.relay("   "),
            Err(RelayError::Validation(_))
        ));
        assert!(session.chat("").starts_with("Sorry, an error occurred"));
    }

    #[test]
    fn tools_are_listed_and_passed_to_the_agent() {
        let agent = Arc::new(RecordingAgent::default());
        let provider = StaticToolProvider::new(vec![ToolSpec::new("search", "search docs")]);
        let exited = provider.exited.clone();
        let session = ChatSession::builder()
            .agent(agent.clone())
            .tool_provider(shared(provider))
            .relay_config(fast())
            .build()
            .expect("session");

        let answer = session.chat("lambda?");
        assert_eq!(answer, "answer to lambda?\n\n🔧 Tools used: search");
        let requests = agent.requests.lock().expect("lock");
        assert_eq!(requests[0].tools, vec![ToolSpec::new("search", "search docs")]);
        assert_eq!(exited.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unreachable_tool_provider_becomes_error_snapshot() {
        let mut provider = StaticToolProvider::new(Vec::new());
        provider.fail_enter = true;
        let session = ChatSession::builder()
            .agent(Arc::new(RecordingAgent::default()))
            .tool_provider(shared(provider))
            .relay_config(fast())
            .build()
            .expect("session");

        let last = session.relay("hi").expect("relay").last().expect("final");
        assert!(
            matches!(&last, Snapshot::Failed(text) if text.contains("tool provider failure (static)"))
        );
    }

    #[test]
    fn concurrent_calls_keep_separate_status() {
        let provider = StaticToolProvider::new(Vec::new());
        let entered = provider.entered.clone();
        let session = ChatSession::builder()
            .agent(Arc::new(RecordingAgent {
                requests: Mutex::new(Vec::new()),
                delay: Duration::from_millis(30),
            }))
            .tool_provider(shared(provider))
            .relay_config(fast())
            .build()
            .expect("session");

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let session = session.clone();
                std::thread::spawn(move || session.chat(format!("q{i}")))
            })
            .collect();
        let answers: Vec<String> = handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect();

        for (i, answer) in answers.iter().enumerate() {
            assert_eq!(answer, &format!("answer to q{i}\n\n🔧 Tools used: search"));
        }
        assert_eq!(entered.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn model_info_lists_settings() {
        let session = ChatSession::builder()
            .agent(Arc::new(ScriptedAgent::new(Vec::new(), ScriptReply::text("x"))))
            .settings(ChatSettings {
                model_id: "model-x".into(),
                region: "ap-northeast-1".into(),
                ..ChatSettings::default()
            })
            .build()
            .expect("session");
        let info = session.model_info();
        assert!(info.contains("model id: model-x\n"));
        assert!(info.contains("region: ap-northeast-1\n"));
        assert!(info.contains("agent: scripted\n"));
    }
}
