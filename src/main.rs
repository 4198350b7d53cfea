use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use backend_runtime::{
    install_shutdown_guard, ArtifactStore, DevRuntimeResolver, PackagedRuntimeResolver,
    ProcessSupervisor, RuntimeExtractor,
};
use chat_store::ChatStore;
use chat_stream::{ChatApiConfig, SessionOutcome};
use ember_chat::app::{ChatController, SessionUpdate};
use ember_chat::config::EnvConfig;
use ember_chat::transport::HttpStreamTransport;

const DEFAULT_MODEL: &str = "openai/gpt-oss-20b";
const READY_WAIT: Duration = Duration::from_secs(30);

fn main() -> io::Result<()> {
    env_logger::init();
    let config = EnvConfig::from_env();

    let supervisor = if config.no_spawn {
        None
    } else {
        Some(start_backend(&config).map_err(io::Error::other)?)
    };
    let _shutdown_guard = supervisor
        .as_ref()
        .map(|supervisor| install_shutdown_guard(Arc::clone(supervisor)));

    let mut api = match &config.backend_url {
        Some(url) => ChatApiConfig::new(url),
        None => ChatApiConfig::default(),
    };
    if let Some(key) = &config.openrouter_key {
        api = api.with_openrouter_key(key);
    }
    let transport = HttpStreamTransport::new(api).map_err(io::Error::other)?;
    if let Err(error) = transport.wait_until_ready(READY_WAIT) {
        log::warn!("backend is not answering its health probe: {error}");
    }

    let model = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let store = ChatStore::new(conversations_root());
    let (controller, updates) = ChatController::new(Arc::new(transport), Some(store), model);

    let stdin = io::stdin();
    let mut out = io::stdout();
    writeln!(out, "ember chat (/new, /list, /load <id>, /delete <id>, /quit)")?;

    loop {
        write!(out, "> ")?;
        out.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" => break,
            "/new" => {
                report(&mut out, controller.new_conversation())?;
            }
            "/list" => match controller.list_conversations() {
                Ok(summaries) => {
                    for summary in summaries {
                        writeln!(
                            out,
                            "{}  {}  {}",
                            summary.conversation_id, summary.created_at, summary.title
                        )?;
                    }
                }
                Err(error) => writeln!(out, "error: {error}")?,
            },
            _ if line.starts_with("/load ") => {
                let id = line["/load ".len()..].trim();
                report(&mut out, controller.load_conversation(id))?;
            }
            _ if line.starts_with("/delete ") => {
                let id = line["/delete ".len()..].trim();
                report(&mut out, controller.delete_conversation(id))?;
            }
            _ => {
                match controller.send(line) {
                    Ok(()) => stream_reply(&mut out, &updates)?,
                    Err(error) => writeln!(out, "error: {error}")?,
                }
            }
        }
    }

    if let Some(supervisor) = supervisor {
        supervisor.stop();
    }
    Ok(())
}

fn start_backend(config: &EnvConfig) -> Result<Arc<ProcessSupervisor>, String> {
    let supervisor = match &config.dev_backend_root {
        Some(root) => {
            let interpreter = config
                .dev_interpreter
                .clone()
                .map(PathBuf::from)
                .unwrap_or_else(|| Path::new(root).join(".venv/bin/python3"));
            Arc::new(ProcessSupervisor::new(DevRuntimeResolver::new(
                interpreter,
                root,
            )))
        }
        None => {
            let mut store = ArtifactStore::new();
            if let Some(archive) = &config.backend_archive {
                store = store.with_archive(archive);
            }
            if let Some(runtime_root) = &config.runtime_root {
                store = store.with_runtime_root(runtime_root);
            }
            let resolver = PackagedRuntimeResolver::new(
                store,
                Arc::new(RuntimeExtractor::new()),
                env!("CARGO_PKG_VERSION"),
            );
            Arc::new(ProcessSupervisor::new(resolver))
        }
    };

    let handle = supervisor.start().map_err(|error| error.to_string())?;
    log::info!("backend running ({}, pid={})", handle.description, handle.pid);
    Ok(supervisor)
}

fn stream_reply(out: &mut impl Write, updates: &Receiver<SessionUpdate>) -> io::Result<()> {
    loop {
        let update = match updates.recv() {
            Ok(update) => update,
            Err(_) => return Ok(()),
        };
        match update {
            SessionUpdate::ContentDelta { text } => {
                write!(out, "{text}")?;
                out.flush()?;
            }
            SessionUpdate::ReasoningDelta { .. } => {}
            SessionUpdate::ConversationLabeled { conversation_id } => {
                log::debug!("conversation labeled {conversation_id}");
            }
            SessionUpdate::Finished { outcome } => {
                match outcome {
                    SessionOutcome::Completed => writeln!(out)?,
                    SessionOutcome::Cancelled => writeln!(out, "\n[cancelled]")?,
                    SessionOutcome::Failed { reason } => writeln!(out, "\n[failed: {reason}]")?,
                }
                return Ok(());
            }
        }
    }
}

fn report(out: &mut impl Write, result: Result<(), String>) -> io::Result<()> {
    if let Err(error) = result {
        writeln!(out, "error: {error}")?;
    }
    Ok(())
}

fn conversations_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ember-chat")
        .join("conversations")
}
