//! CLI entry point: one-shot prompt dispatch or an interactive
//! read-dispatch-print loop with slash commands.

use crate::{AgentConfig, Session};
use anyhow::Context;
use clap::{Arg, Command};
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing::info;

const QUIT_KEYWORDS: [&str; 4] = ["exit", "quit", "/exit", "退出"];

pub async fn run() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let matches = Command::new("tool-agent")
        .version("0.1.0")
        .about("Route free-text instructions to calculator, time, file and web tools")
        .arg(
            Arg::new("prompt")
                .help("Run a single instruction and exit; omit for interactive mode")
                .index(1),
        )
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .help("Root directory the file tool is confined to (or AGENT_FILE_ROOT)"),
        )
        .arg(
            Arg::new("max-history")
                .long("max-history")
                .value_name("COUNT")
                .help("History entries kept per session (or MAX_HISTORY)"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("SECONDS")
                .help("Network request timeout in seconds (or AGENT_TIMEOUT_SECS)"),
        )
        .get_matches();

    // MissingCredential aborts startup; nothing else is fatal from here on.
    let mut config = AgentConfig::from_env().context("startup configuration failed")?;
    if let Some(root) = matches.get_one::<String>("root") {
        config = config.with_file_root(root);
    }
    if let Some(raw) = matches.get_one::<String>("max-history") {
        config = config.with_max_history(raw.parse().context("bad --max-history value")?);
    }
    if let Some(raw) = matches.get_one::<String>("timeout") {
        let seconds: u64 = raw.parse().context("bad --timeout value")?;
        config = config.with_request_timeout(Duration::from_secs(seconds));
    }

    let mut session = Session::new(&config).context("failed to build session")?;
    info!(
        root = %config.file_root.display(),
        max_history = config.max_history,
        "session ready"
    );

    if let Some(prompt) = matches.get_one::<String>("prompt") {
        let reply = session.handle(prompt).await;
        println!("{}", reply);
        return Ok(());
    }

    interactive_loop(&mut session).await
}

async fn interactive_loop(session: &mut Session) -> anyhow::Result<()> {
    println!("tool-agent interactive mode. /help for commands, /exit to quit.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        // EOF ends the loop the same way an explicit quit does.
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if QUIT_KEYWORDS.contains(&input.to_lowercase().as_str()) {
            break;
        }

        if let Some(command) = input.strip_prefix('/') {
            handle_command(session, command);
            continue;
        }

        let reply = session.handle(input).await;
        println!("{}", reply);
    }

    println!("bye");
    Ok(())
}

fn handle_command(session: &mut Session, command: &str) {
    match command {
        "help" => {
            println!("commands:");
            println!("  /help     show this help");
            println!("  /history  show recent turns");
            println!("  /tools    list available tools");
            println!("  /clear    clear conversation history");
            println!("  /exit     quit");
        }
        "history" => {
            if session.history().is_empty() {
                println!("no history yet");
                return;
            }
            for (index, entry) in session.history().entries().enumerate() {
                let status = if entry.outcome.success { "ok" } else { "err" };
                println!(
                    "{}. [{} {}] {}",
                    index + 1,
                    entry.timestamp.format("%H:%M:%S"),
                    status,
                    entry.instruction
                );
            }
        }
        "tools" => {
            for (name, description) in session.tool_summaries() {
                println!("{}: {}", name, description);
            }
        }
        "clear" => {
            session.clear_history();
            println!("history cleared");
        }
        other => println!("unknown command: /{} (try /help)", other),
    }
}
