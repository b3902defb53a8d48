use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::errors::RelayError;

/// Knobs for one relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Longest time the relay waits on the queue before re-checking the
    /// worker and the abort flag.
    pub poll_interval: Duration,
    /// Upper bound, in characters, for any free-text payload put on the queue.
    pub preview_chars: usize,
    /// Append the list of tools used to the final answer.
    pub tool_summary: bool,
    /// Bounded buffer between the relay thread and an async consumer.
    pub stream_buffer_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            preview_chars: 50,
            tool_summary: true,
            stream_buffer_capacity: 32,
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    pub fn tool_summary(mut self, enabled: bool) -> Self {
        self.tool_summary = enabled;
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.poll_interval.is_zero() {
            return Err(RelayError::Config(
                "poll_interval must be greater than 0".into(),
            ));
        }
        if self.preview_chars == 0 {
            return Err(RelayError::Config(
                "preview_chars must be greater than 0".into(),
            ));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(RelayError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Application and model settings shown by the chat front end.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatSettings {
    pub title: String,
    pub description: String,
    pub model_provider: String,
    pub model_id: String,
    pub region: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub relay: RelayConfig,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            title: "Agent Chat".to_string(),
            description: "Chat with an agent and its tool servers".to_string(),
            model_provider: "bedrock".to_string(),
            model_id: "anthropic.claude-3-haiku-20240307-v1:0".to_string(),
            region: "us-west-2".to_string(),
            max_tokens: 4000,
            temperature: 0.7,
            relay: RelayConfig::default(),
        }
    }
}

impl ChatSettings {
    /// Builds settings from the process environment.
    ///
    /// Unset variables keep their defaults; unparseable numbers are logged
    /// and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(default)
        };
        let region = lookup("MODEL_REGION")
            .or_else(|| lookup("AWS_DEFAULT_REGION"))
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.region);

        let relay = RelayConfig {
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "RELAY_POLL_INTERVAL_MS",
                defaults.relay.poll_interval.as_millis() as u64,
            )),
            preview_chars: parse_or(&lookup, "RELAY_PREVIEW_CHARS", defaults.relay.preview_chars),
            ..defaults.relay
        };

        Self {
            title: text("APP_TITLE", defaults.title),
            description: text("APP_DESCRIPTION", defaults.description),
            model_provider: text("MODEL_PROVIDER", defaults.model_provider),
            model_id: text("MODEL_ID", defaults.model_id),
            region,
            max_tokens: parse_or(&lookup, "MODEL_MAX_TOKENS", defaults.max_tokens),
            temperature: parse_or(&lookup, "MODEL_TEMPERATURE", defaults.temperature),
            relay,
        }
    }

    /// Model settings in the layout of the chat UI's model panel.
    pub fn model_summary(&self) -> String {
        let mut out = String::from("✅ Model in use:\n");
        out.push_str(&format!("provider: {}\n", self.model_provider));
        out.push_str(&format!("model id: {}\n", self.model_id));
        out.push_str(&format!("region: {}\n", self.region));
        out.push_str(&format!("max tokens: {}\n", self.max_tokens));
        out.push_str(&format!("temperature: {}\n", self.temperature));
        out
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparseable setting");
                default
            }
        },
        None => default,
    }
}

/// Loads `.env` from the working directory, if there is one.
pub fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        warn!(error = %err, "failed to load .env");
    }
}

/// Launch definition of one subprocess tool server.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ToolServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Tool server definitions read from a JSON configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ToolServersFile {
    #[serde(rename = "mcpServers", default)]
    pub servers: BTreeMap<String, ToolServerConfig>,
}

impl ToolServersFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let file_error = |message: String| RelayError::ConfigFile {
            path: path.display().to_string(),
            message,
        };
        let raw = std::fs::read_to_string(path).map_err(|err| file_error(err.to_string()))?;
        serde_json::from_str(&raw).map_err(|err| file_error(err.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&ToolServerConfig> {
        self.servers.get(name)
    }

    /// Numbered, human-readable listing of the configured servers.
    pub fn server_list(&self) -> String {
        if self.servers.is_empty() {
            return "No tool servers configured.".to_string();
        }
        let mut out = String::from("Configured tool servers:\n");
        for (index, (name, server)) in self.servers.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", index + 1, name));
            out.push_str(&format!("   command: {}\n", server.command));
            if !server.args.is_empty() {
                out.push_str(&format!("   args: {}\n", server.args.join(" ")));
            }
            out.push('\n');
        }
        out
    }
}
