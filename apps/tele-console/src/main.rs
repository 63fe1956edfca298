//! Operator console for the teleoperation control plane.
//!
//! Session subcommands drive the crash-resilient session manager against a
//! local state directory; bag, act and logs subcommands talk to the
//! server's HTTP surface. Output is JSON, one document per invocation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use tele_events::Bus;
use tele_session::{
    HttpLogSink, SessionManager, SessionOptions, SessionPhase, SessionStore, StartOptions,
};

#[derive(Parser)]
#[command(name = "tele-console", version, about = "Teleoperation operator console")]
struct Cli {
    /// Server base URL (default: TELE_SERVER_URL or http://127.0.0.1:8090)
    #[arg(long)]
    server: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Experiment session recording
    Session {
        #[command(subcommand)]
        cmd: SessionCmd,
    },
    /// Bulk-sensor bag recording
    Bag {
        #[command(subcommand)]
        cmd: BagCmd,
    },
    /// Submit one action through the gateway
    Act {
        /// Path-like handler name, e.g. /arm/move
        action_name: String,
        /// Registered action type tag, e.g. ArmMove
        action_type: String,
        /// Goal parameters as a JSON object
        #[arg(long, default_value = "{}")]
        goal: String,
    },
    /// Stored session logs
    Logs {
        #[command(subcommand)]
        cmd: LogsCmd,
    },
}

#[derive(Subcommand)]
enum SessionCmd {
    /// Start a session (fails while one is active)
    Start {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        operator: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Log one event into the active session
    Log {
        event_type: String,
        action: String,
        #[arg(long, default_value = "{}")]
        details: String,
        #[arg(long)]
        operator: Option<String>,
    },
    /// Push unacknowledged events to the log store
    Sync,
    /// End the active session (final sync is best-effort)
    Stop,
    /// Local state machine snapshot
    Status,
    /// Drop the local session document
    Clear {
        /// Discard even if events are unsynced
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum BagCmd {
    Start {
        #[arg(long)]
        name: Option<String>,
        /// Comma-separated topic list; server defaults apply when omitted
        #[arg(long)]
        topics: Option<String>,
    },
    Stop,
    Status,
}

#[derive(Subcommand)]
enum LogsCmd {
    /// List stored session logs
    List,
    /// Fetch one session's raw log
    Download {
        session_id: String,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn server_base(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("TELE_SERVER_URL").ok())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "http://127.0.0.1:8090".to_string())
        .trim_end_matches('/')
        .to_string()
}

fn console_state_dir() -> PathBuf {
    std::env::var("TELE_CONSOLE_STATE_DIR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("console_state"))
        .join("sessions")
}

async fn manager(server: &str) -> Arc<SessionManager> {
    SessionManager::new(
        SessionStore::new(console_state_dir()),
        Arc::new(HttpLogSink::new(server)),
        Bus::default(),
        SessionOptions::from_env(),
    )
    .await
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle => "idle",
        SessionPhase::Active => "active",
        SessionPhase::EndedPendingSync => "ended_pending_sync",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();
    let server = server_base(cli.server.clone());
    match cli.command {
        Commands::Session { cmd } => session_cmd(&server, cmd).await,
        Commands::Bag { cmd } => bag_cmd(&server, cmd).await,
        Commands::Act {
            action_name,
            action_type,
            goal,
        } => act_cmd(&server, action_name, action_type, goal).await,
        Commands::Logs { cmd } => logs_cmd(&server, cmd).await,
    }
}

async fn session_cmd(server: &str, cmd: SessionCmd) -> Result<()> {
    let manager = manager(server).await;
    match cmd {
        SessionCmd::Start {
            name,
            operator,
            notes,
        } => {
            let session_id = manager
                .start_session(StartOptions {
                    name,
                    operator,
                    notes,
                })
                .await?;
            print_json(&json!({"ok": true, "session_id": session_id}));
        }
        SessionCmd::Log {
            event_type,
            action,
            details,
            operator,
        } => {
            let details: Value =
                serde_json::from_str(&details).context("--details must be valid JSON")?;
            manager
                .log_event(&event_type, &action, details, operator)
                .await?;
            let status = manager.status().await;
            print_json(&json!({"ok": true, "events": status.events}));
        }
        SessionCmd::Sync => {
            let outcome = manager.synchronize().await?;
            let status = manager.status().await;
            print_json(&json!({
                "ok": true,
                "outcome": format!("{outcome:?}"),
                "watermark": status.watermark,
                "events": status.events,
            }));
        }
        SessionCmd::Stop => {
            let summary = manager.stop_session().await?;
            let phase = manager.phase().await;
            print_json(&json!({
                "ok": true,
                "session_id": summary.session_id,
                "ended": summary.end_time,
                "phase": phase_label(phase),
            }));
        }
        SessionCmd::Status => {
            let status = manager.status().await;
            print_json(&json!({
                "phase": phase_label(status.phase),
                "session_id": status.session_id,
                "events": status.events,
                "watermark": status.watermark,
            }));
        }
        SessionCmd::Clear { force } => {
            manager.clear(force).await?;
            print_json(&json!({"ok": true}));
        }
    }
    Ok(())
}

async fn bag_cmd(server: &str, cmd: BagCmd) -> Result<()> {
    let client = reqwest::Client::new();
    let value: Value = match cmd {
        BagCmd::Start { name, topics } => {
            let topics: Option<Vec<String>> = topics.map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|topic| !topic.is_empty())
                    .map(str::to_string)
                    .collect()
            });
            client
                .post(format!("{server}/bag/start"))
                .json(&json!({"session_name": name, "topics": topics}))
                .send()
                .await
                .context("bag start request")?
                .json()
                .await
                .context("bag start response")?
        }
        BagCmd::Stop => client
            .post(format!("{server}/bag/stop"))
            .json(&json!({}))
            .send()
            .await
            .context("bag stop request")?
            .json()
            .await
            .context("bag stop response")?,
        BagCmd::Status => client
            .get(format!("{server}/bag/status"))
            .send()
            .await
            .context("bag status request")?
            .json()
            .await
            .context("bag status response")?,
    };
    print_json(&value);
    Ok(())
}

async fn act_cmd(
    server: &str,
    action_name: String,
    action_type: String,
    goal: String,
) -> Result<()> {
    let goal: Value = serde_json::from_str(&goal).context("--goal must be valid JSON")?;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{server}/generic-action"))
        .json(&json!({
            "action_name": action_name,
            "action_type": action_type,
            "goal": goal,
        }))
        .send()
        .await
        .context("generic-action request")?;
    let status = resp.status();
    let body: Value = resp.json().await.context("generic-action response")?;
    print_json(&body);
    if !status.is_success() {
        anyhow::bail!("action failed with HTTP {status}");
    }
    Ok(())
}

async fn logs_cmd(server: &str, cmd: LogsCmd) -> Result<()> {
    let client = reqwest::Client::new();
    match cmd {
        LogsCmd::List => {
            let value: Value = client
                .get(format!("{server}/experiment/logs/list"))
                .send()
                .await
                .context("logs list request")?
                .json()
                .await
                .context("logs list response")?;
            print_json(&value);
        }
        LogsCmd::Download { session_id, out } => {
            let resp = client
                .get(format!("{server}/experiment/logs/download/{session_id}"))
                .send()
                .await
                .context("logs download request")?;
            if !resp.status().is_success() {
                anyhow::bail!("download failed with HTTP {}", resp.status());
            }
            let text = resp.text().await.context("logs download body")?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &text)
                        .with_context(|| format!("write {}", path.display()))?;
                    print_json(&json!({"ok": true, "path": path.display().to_string()}));
                }
                None => print!("{text}"),
            }
        }
    }
    Ok(())
}
