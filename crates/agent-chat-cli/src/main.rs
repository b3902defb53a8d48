use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_chat_relay::prelude::*;
use agent_chat_relay::tools::{self, ToolScope};
use agent_chat_relay::{ScriptReply, ToolServersFile, init_observability, load_dotenv};
use anyhow::{Context as _, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "agent-chat",
    about = "Relay live agent status to the terminal while a call runs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted agent call and print every snapshot
    Replay {
        /// Script file (steps and reply)
        #[arg(long)]
        script: PathBuf,

        /// Prompt sent to the agent
        #[arg(long)]
        prompt: String,

        /// Tool server configuration file
        #[arg(long, requires = "server")]
        servers: Option<PathBuf>,

        /// Tool server to enter for the call
        #[arg(long, requires = "servers")]
        server: Option<String>,

        /// Longest free-text preview, in characters
        #[arg(long)]
        preview_chars: Option<usize>,

        /// Do not append the list of tools used to the answer
        #[arg(long)]
        no_tool_summary: bool,
    },

    /// List the tool servers in a configuration file
    Servers {
        #[arg(long)]
        config: PathBuf,
    },

    /// Start a tool server and list the tools it exposes
    Tools {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        server: String,

        /// Print the tools as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the model settings read from the environment
    Info {
        /// Script whose agent would serve the calls
        #[arg(long)]
        script: Option<PathBuf>,

        /// Tool server configuration file
        #[arg(long, requires = "server")]
        servers: Option<PathBuf>,

        /// Tool server entered for each call
        #[arg(long, requires = "servers")]
        server: Option<String>,
    },
}

fn main() -> Result<()> {
    load_dotenv();
    init_observability();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            script,
            prompt,
            servers,
            server,
            preview_chars,
            no_tool_summary,
        } => {
            let mut settings = ChatSettings::from_env();
            if let Some(chars) = preview_chars {
                settings.relay.preview_chars = chars;
            }
            settings.relay.tool_summary = !no_tool_summary;

            let agent = ScriptedAgent::load(&script)?;
            let session = build_session(agent, settings, servers.as_deref(), server.as_deref())?;

            let relay = session.relay(prompt)?;
            info!(call_id = %relay.call_id(), script = %script.display(), "replaying script");
            for snapshot in relay {
                match &snapshot {
                    Snapshot::Started(text) | Snapshot::Progress(text) => {
                        let line = text.lines().last().unwrap_or_default();
                        println!("{line}");
                    }
                    Snapshot::Completed(text) | Snapshot::Failed(text) | Snapshot::Cancelled(text) => {
                        println!();
                        println!("{text}");
                    }
                }
            }
        }
        Commands::Servers { config } => {
            let servers = ToolServersFile::load(&config)?;
            print!("{}", servers.server_list());
            if servers.servers.is_empty() {
                println!();
            }
        }
        Commands::Tools {
            config,
            server,
            json,
        } => {
            let mut provider = stdio_provider(&config, &server)?;
            let specs = {
                let mut scope = ToolScope::enter(&mut provider)
                    .with_context(|| format!("failed to start tool server `{server}`"))?;
                scope.list_tools()?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&specs)?);
            } else if specs.is_empty() {
                println!("`{server}` exposes no tools.");
            } else {
                for spec in &specs {
                    if spec.description.is_empty() {
                        println!("- {}", spec.name);
                    } else {
                        println!("- {}: {}", spec.name, spec.description);
                    }
                }
            }
        }
        Commands::Info {
            script,
            servers,
            server,
        } => {
            let settings = ChatSettings::from_env();
            println!("{}", settings.title);
            println!("{}", settings.description);
            println!();
            let agent = match &script {
                Some(path) => ScriptedAgent::load(path)?,
                None => ScriptedAgent::new(Vec::new(), ScriptReply::text("")),
            };
            let session = build_session(agent, settings, servers.as_deref(), server.as_deref())?;
            print!("{}", session.model_info());
        }
    }

    Ok(())
}

fn build_session(
    agent: ScriptedAgent,
    settings: ChatSettings,
    servers: Option<&Path>,
    server: Option<&str>,
) -> Result<ChatSession> {
    let mut builder = ChatSession::builder()
        .agent(Arc::new(agent))
        .settings(settings);
    if let (Some(path), Some(name)) = (servers, server) {
        builder = builder.tool_provider(tools::shared(stdio_provider(path, name)?));
    }
    Ok(builder.build()?)
}

fn stdio_provider(config: &Path, name: &str) -> Result<StdioToolProvider> {
    let servers = ToolServersFile::load(config)?;
    let server = servers
        .get(name)
        .cloned()
        .ok_or_else(|| anyhow!("tool server `{name}` not found in {}", config.display()))?;
    Ok(StdioToolProvider::new(name, server))
}
