//! Interactive terminal loop over the chat orchestrator.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;

use jarvis_chat::{parse_temperature, ChatError, ChatOrchestrator, TemperaturePreset, TurnReply};
use jarvis_core::types::SessionSummary;

const HELP: &str = "\
Commands:
  /new                      start a new session (the current one is saved)
  /save                     save the current session
  /load <id>                switch to a saved session
  /delete <id>              delete a saved session
  /list                     list saved sessions
  /clear                    clear the current conversation
  /context                  show the investigation context
  /temperature [preset|n]   show or set the sampling temperature
  /help                     show this help
  /quit                     exit
Anything else is sent as a question. Ctrl-C cancels a pending answer.";

/// One line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Send(String),
    New,
    Save,
    Load(String),
    Delete(String),
    List,
    Clear,
    Context,
    Temperature(Option<String>),
    Help,
    Quit,
    Unknown(String),
}

/// Parse a line of input. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Send(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim().to_string()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };

    let command = match (name.to_lowercase().as_str(), arg) {
        ("new", _) => Command::New,
        ("save", _) => Command::Save,
        ("load", Some(id)) => Command::Load(id),
        ("delete", Some(id)) => Command::Delete(id),
        ("list", _) => Command::List,
        ("clear", _) => Command::Clear,
        ("context", _) => Command::Context,
        ("temperature" | "temp", arg) => Command::Temperature(arg),
        ("help", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(command)
}

/// Read commands from stdin until `/quit`, end of input, or Ctrl-C at the
/// prompt.
pub async fn run(chat: &mut ChatOrchestrator) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Jarvis ready. Type /help for commands.");
    if !chat.engine_ready() {
        println!("Reasoning engine unavailable: set the API key and restart to ask questions.");
    }

    // Once `send` has listened for Ctrl-C the default SIGINT exit is gone,
    // so the idle prompt has to listen too.
    while let Some(line) = next_input(&mut lines, interrupted()).await? {
        let Some(command) = parse_command(&line) else {
            continue;
        };
        if command == Command::Quit {
            break;
        }
        execute(chat, command).await;
    }

    if let Err(e) = chat.save_session() {
        tracing::warn!(error = %e, "Final save failed");
    }
    Ok(())
}

/// Next input line. `None` at end of input or when `interrupt` fires
/// first; `next_line` is cancel safe so no input is lost.
async fn next_input<R, I>(lines: &mut Lines<R>, interrupt: I) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = ()>,
{
    tokio::select! {
        line = lines.next_line() => line,
        () = interrupt => {
            println!();
            tracing::info!("Interrupted at prompt");
            Ok(None)
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Ctrl-C handler unavailable");
        std::future::pending::<()>().await;
    }
}

async fn execute(chat: &mut ChatOrchestrator, command: Command) {
    match command {
        Command::Send(text) => send(chat, &text).await,
        Command::New => println!("Started session {}", chat.new_session()),
        Command::Save => match chat.save_session() {
            Ok(()) => println!("Session saved."),
            Err(e) => println!("Save failed: {}", e),
        },
        Command::Load(id) => match chat.load_session(&id) {
            Ok(session) => {
                println!(
                    "Loaded {} ({}, {} messages)",
                    session.id,
                    session.display_title(),
                    session.message_count()
                );
            }
            Err(e) => println!("{}", e),
        },
        Command::Delete(id) => match chat.delete_session(&id) {
            Ok(()) => println!("Deleted {}", id),
            Err(e) => println!("{}", e),
        },
        Command::List => match chat.list_sessions() {
            Ok(sessions) if sessions.is_empty() => println!("No saved sessions."),
            Ok(sessions) => sessions.iter().for_each(|s| println!("{}", format_summary(s))),
            Err(e) => println!("{}", e),
        },
        Command::Clear => {
            chat.clear_history();
            println!("Conversation cleared.");
        }
        Command::Context => {
            let lines = chat.context().describe();
            if lines.is_empty() {
                println!("No active investigation context.");
            } else {
                lines.iter().for_each(|l| println!("{}", l));
            }
        }
        Command::Temperature(None) => {
            println!("Temperature: {}", chat.temperature());
            for preset in TemperaturePreset::ALL {
                println!("  {}", preset);
            }
        }
        Command::Temperature(Some(value)) => match parse_temperature(&value) {
            Ok(t) => {
                chat.set_temperature(t);
                println!("Temperature set to {}", t);
            }
            Err(e) => println!("{}", e),
        },
        Command::Help => println!("{}", HELP),
        Command::Unknown(line) => println!("Unknown command: {} (try /help)", line),
        Command::Quit => {}
    }
}

async fn send(chat: &mut ChatOrchestrator, text: &str) {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = chat.send_message_with_cancel(text, cancel).await;
    watcher.abort();

    match result {
        Ok(reply) => print_reply(&reply),
        Err(ChatError::EngineUnavailable) => {
            println!("Reasoning engine unavailable: message not sent.")
        }
        Err(e) => println!("{}", e),
    }
}

fn print_reply(reply: &TurnReply) {
    println!("\n{}", reply.displayable_text);
    for artifact in &reply.artifacts {
        match artifact.description {
            Some(ref description) => println!("  [{}] {}", artifact.kind, description),
            None => println!("  [{}]", artifact.kind),
        }
    }
    println!("  ({}, {} ms)\n", reply.model_label, reply.latency_ms);
}

fn format_summary(summary: &SessionSummary) -> String {
    format!(
        "{}  {}  ({} messages, last active {})",
        summary.id,
        summary.title,
        summary.message_count,
        summary
            .last_updated_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
    )
}
