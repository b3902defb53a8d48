/// Errors raised by an agent collaborator while serving a single call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// The hosted model or orchestration runtime reported a failure.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// The upstream call did not finish in time.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl AgentError {
    /// Creates an upstream failure.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Creates a timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Upstream(message) | Self::Timeout(message) => message,
        }
    }
}

/// Errors returned by a tool provider while it is entered or queried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolProviderError {
    /// The provider process could not be started.
    #[error("failed to start tool server ({server}): {message}")]
    Spawn { server: String, message: String },
    /// Reading from or writing to the provider failed.
    #[error("tool server i/o error ({server}): {message}")]
    Io { server: String, message: String },
    /// The provider answered with an error or an unexpected shape.
    #[error("tool server protocol error ({server}): {message}")]
    Protocol { server: String, message: String },
    /// The provider did not answer within the configured timeout.
    #[error("tool server timed out ({server}) waiting for `{method}`")]
    Timeout { server: String, method: String },
    /// The provider was queried before being entered.
    #[error("tool server not entered ({server})")]
    NotEntered { server: String },
}

impl ToolProviderError {
    pub(crate) fn io(server: &str, err: impl std::fmt::Display) -> Self {
        Self::Io {
            server: server.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn protocol(server: &str, message: impl Into<String>) -> Self {
        Self::Protocol {
            server: server.to_string(),
            message: message.into(),
        }
    }
}

/// Terminal failure recorded for one call.
///
/// A failure never crosses the worker thread boundary as a live error; it is
/// stored in the call outcome and rendered for the user once the call ends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum CallFailure {
    /// The agent call itself failed.
    #[error("{message}")]
    Agent { message: String },
    /// A tool provider could not be entered or listed.
    #[error("tool provider failure ({provider}): {message}")]
    ToolProvider { provider: String, message: String },
    /// The agent call panicked on the worker thread.
    #[error("agent call panicked: {message}")]
    Panicked { message: String },
    /// The worker thread could not be started.
    #[error("failed to start worker: {message}")]
    WorkerSpawn { message: String },
    /// The worker ended without recording a result.
    #[error("worker ended without an outcome")]
    Lost,
}

impl From<AgentError> for CallFailure {
    fn from(value: AgentError) -> Self {
        CallFailure::Agent {
            message: value.to_string(),
        }
    }
}

pub(crate) fn call_failure_from_tool_error(provider: &str, err: &ToolProviderError) -> CallFailure {
    CallFailure::ToolProvider {
        provider: provider.to_string(),
        message: err.to_string(),
    }
}

/// Top-level error type for the public relay API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Invalid session or relay configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// A configuration file could not be read or parsed.
    #[error("config file error ({path}): {message}")]
    ConfigFile { path: String, message: String },
    /// A tool provider failed outside of a call.
    #[error(transparent)]
    ToolProvider(ToolProviderError),
}

impl From<ToolProviderError> for RelayError {
    fn from(value: ToolProviderError) -> Self {
        RelayError::ToolProvider(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_error_keeps_message_in_call_failure() {
        let failure = CallFailure::from(AgentError::timeout("upstream down"));
        assert_eq!(failure.to_string(), "timeout: upstream down");
    }

    #[test]
    fn tool_error_maps_to_tool_provider_failure() {
        let err = ToolProviderError::Timeout {
            server: "docs".into(),
            method: "tools/list".into(),
        };
        let failure = call_failure_from_tool_error("docs", &err);
        assert!(matches!(
            &failure,
            CallFailure::ToolProvider { provider, message }
                if provider == "docs" && message.contains("tools/list")
        ));
    }
}
