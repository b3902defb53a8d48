use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "agent-chat.logs.jsonl";

/// Where log lines go.
#[derive(Clone, Debug, PartialEq, Eq)]
enum LogSink {
    Disabled,
    /// Compact human-readable lines on stderr; stdout belongs to the chat output.
    Console,
    /// JSONL appended to a file.
    JsonFile(PathBuf),
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn resolve_sink(lookup: impl Fn(&str) -> Option<String>) -> LogSink {
    let enabled = lookup("AGENT_CHAT_OBSERVABILITY")
        .and_then(|value| parse_switch(&value))
        .unwrap_or(true);
    if !enabled {
        return LogSink::Disabled;
    }
    match lookup("AGENT_CHAT_JSON_LOG_PATH").filter(|path| !path.trim().is_empty()) {
        Some(path) => LogSink::JsonFile(PathBuf::from(path)),
        None => LogSink::Console,
    }
}

fn resolve_filter(lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
    if let Some(level) = lookup("AGENT_CHAT_LOG_LEVEL")
        && let Ok(filter) = EnvFilter::try_new(level)
    {
        return filter;
    }
    lookup("RUST_LOG")
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Installs the process-wide tracing subscriber. Later calls do nothing.
///
/// Environment variables:
/// - `AGENT_CHAT_OBSERVABILITY`: `0`/`false`/`off` disables logging (default on).
/// - `AGENT_CHAT_LOG_LEVEL`: filter directives, e.g. `debug` or `agent_chat_relay=trace`.
/// - `RUST_LOG`: used when `AGENT_CHAT_LOG_LEVEL` is unset or invalid.
/// - `AGENT_CHAT_JSON_LOG_PATH`: write JSONL to this file instead of the console.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let lookup = |key: &str| std::env::var(key).ok();
        let filter = resolve_filter(lookup);
        match resolve_sink(lookup) {
            LogSink::Disabled => {}
            LogSink::Console => {
                let console = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(console)
                    .try_init();
            }
            LogSink::JsonFile(path) => {
                let (dir, file_name) = split_log_path(&path);
                if !dir.as_os_str().is_empty() {
                    let _ = std::fs::create_dir_all(&dir);
                }
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(json)
                    .try_init();
            }
        }
    });
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (dir, file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn console_is_the_default_sink() {
        assert_eq!(resolve_sink(vars(&[])), LogSink::Console);
    }

    #[test]
    fn switch_disables_logging() {
        assert_eq!(
            resolve_sink(vars(&[("AGENT_CHAT_OBSERVABILITY", "off")])),
            LogSink::Disabled
        );
        assert_eq!(
            resolve_sink(vars(&[("AGENT_CHAT_OBSERVABILITY", "maybe")])),
            LogSink::Console
        );
    }

    #[test]
    fn json_path_selects_file_sink() {
        assert_eq!(
            resolve_sink(vars(&[("AGENT_CHAT_JSON_LOG_PATH", "logs/chat.jsonl")])),
            LogSink::JsonFile(PathBuf::from("logs/chat.jsonl"))
        );
        assert_eq!(
            split_log_path(Path::new("logs/chat.jsonl")),
            (PathBuf::from("logs"), "chat.jsonl".to_string())
        );
        assert_eq!(
            split_log_path(Path::new("chat.jsonl")),
            (PathBuf::from("."), "chat.jsonl".to_string())
        );
    }

    #[test]
    fn level_override_wins_over_rust_log() {
        let filter = resolve_filter(vars(&[
            ("AGENT_CHAT_LOG_LEVEL", "debug"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(filter.to_string(), "debug");

        let fallback = resolve_filter(vars(&[("RUST_LOG", "warn")]));
        assert_eq!(fallback.to_string(), "warn");
        assert_eq!(resolve_filter(vars(&[])).to_string(), "info");
    }
}
