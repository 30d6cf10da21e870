mod client;
mod render;

use std::io::{self, Write};

use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;

use agent_core::Conversation;
use chat_core::{build_outline_tree, Block, MessageId, Role};
use chat_state::{ChatStatus, ClientMessage, ClientSession, ProtocolError};

use client::{apply_frame, ChatClient};
use render::{history_lines, outline_lines, Renderer};

#[derive(Parser)]
#[command(name = "agent-cli")]
#[command(about = "Terminal client for the branching chat server")]
#[command(version)]
struct Cli {
    #[arg(long, env = "BRANCHCHAT_SERVER", default_value = "http://localhost:8080")]
    server_url: String,

    /// Conversation to work on; chat and send start a new one when omitted
    #[arg(long, short)]
    conversation: Option<String>,

    /// Enable debug mode
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat
    Chat,
    /// Send a single message and stream the reply
    Send {
        /// Message content
        message: String,
    },
    /// Reattach to a conversation and stream whatever is still running
    Resume,
    /// Print the active branch
    History,
    /// Print every branch of the conversation
    Outline,
    /// List saved conversations, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        cursor: Option<String>,
    },
    /// Abort the running request
    Stop,
    /// Branch off a user message with new text and request a reply
    Edit {
        /// 1-based position on the active branch
        depth: usize,
        message_id: MessageId,
        text: String,
    },
    /// Request another reply next to an assistant message
    Regenerate {
        /// 1-based position on the active branch
        depth: usize,
        message_id: MessageId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        eprintln!("{}", "[DEBUG] Debug mode enabled".dimmed());
        eprintln!(
            "{}",
            format!("[DEBUG] Server URL: {}", cli.server_url).dimmed()
        );
    }

    let client = ChatClient::new(&cli.server_url, cli.debug);
    let conversation = cli.conversation;

    match cli.command {
        Commands::Chat => {
            let id = conversation.unwrap_or_else(new_conversation_id);
            run_interactive_chat(&client, &id).await
        }
        Commands::Send { message } => {
            let id = conversation.unwrap_or_else(new_conversation_id);
            send_message(&client, &id, &message).await
        }
        Commands::Resume => resume(&client, &required(conversation)?).await,
        Commands::History => show_history(&client, &required(conversation)?).await,
        Commands::Outline => show_outline(&client, &required(conversation)?).await,
        Commands::List { limit, cursor } => list_conversations(&client, limit, cursor.as_deref()).await,
        Commands::Stop => stop(&client, &required(conversation)?).await,
        Commands::Edit {
            depth,
            message_id,
            text,
        } => edit(&client, &required(conversation)?, depth, message_id, &text).await,
        Commands::Regenerate { depth, message_id } => {
            regenerate(&client, &required(conversation)?, depth, message_id).await
        }
    }
}

fn new_conversation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn required(conversation: Option<String>) -> anyhow::Result<String> {
    conversation.ok_or_else(|| anyhow!("this command needs --conversation"))
}

/// Sends a request frame, then streams until the request settles.
///
/// Ctrl-C aborts the request instead of leaving it running on the server.
async fn run_request(
    client: &ChatClient,
    session: &mut ClientSession,
    request: ClientMessage,
    renderer: &mut Renderer,
) -> anyhow::Result<ChatStatus> {
    let reply = client.send(&request).await?;
    let applied = apply_frame(session, reply, &mut |event| renderer.event(event));
    match applied {
        Ok(()) => {}
        Err(ProtocolError::Busy { current_request_id }) => {
            println!(
                "{}",
                format!("⏳ Busy with request {}; try resume or stop", current_request_id).yellow()
            );
            return Ok(session.status());
        }
        Err(error) => return Err(error.into()),
    }

    let followed = {
        let follow = client.follow(session, renderer);
        tokio::pin!(follow);
        tokio::select! {
            result = &mut follow => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    };

    let status = match followed {
        Some(result) => result?,
        None => {
            if let Some(abort) = session.abort() {
                let reply = client.send(&abort).await?;
                if let Err(error) = apply_frame(session, reply, &mut |_| {}) {
                    renderer.protocol_error(&error);
                }
            }
            session.status()
        }
    };
    renderer.status(status);
    Ok(status)
}

async fn send_message(client: &ChatClient, conversation_id: &str, message: &str) -> anyhow::Result<()> {
    let mut session = client.open_session(conversation_id, &mut |_| {}).await?;
    let mut renderer = Renderer::new();

    println!("{}", format!("🚀 Sending message: {}", message).cyan());
    println!("{}", format!("Conversation: {}", conversation_id).dimmed());

    let request = session.send_text(message)?;
    run_request(client, &mut session, request, &mut renderer).await?;
    Ok(())
}

async fn run_interactive_chat(client: &ChatClient, conversation_id: &str) -> anyhow::Result<()> {
    let mut session = client.open_session(conversation_id, &mut |_| {}).await?;
    let mut renderer = Renderer::new();

    println!("{}", "🤖 Branching Chat".cyan().bold());
    println!("{}", format!("Conversation: {}", conversation_id).dimmed());
    if !session.snapshot().is_empty() {
        let depth = session.snapshot().current_path.len();
        println!("{}", format!("Resumed with {} message(s) on the active branch", depth).dimmed());
    }
    println!("{}", "Type 'exit' or 'quit' to leave".dimmed());
    println!();

    loop {
        print!("{} ", "You:".cyan().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("{}", "👋 Goodbye!".cyan());
            break;
        }
        if input.is_empty() {
            continue;
        }

        println!("{}", "Assistant:".green().bold());
        let result = match client.catch_up(&mut session, &mut |_| {}).await {
            Ok(()) => match session.send_text(input) {
                Ok(request) => run_request(client, &mut session, request, &mut renderer)
                    .await
                    .map(|_| ()),
                Err(error) => Err(error.into()),
            },
            Err(error) => Err(error),
        };
        if let Err(error) = result {
            println!("{}", format!("❌ Error: {}", error).red());
        }
        println!();
    }

    Ok(())
}

async fn resume(client: &ChatClient, conversation_id: &str) -> anyhow::Result<()> {
    let mut renderer = Renderer::new();
    let mut session = client
        .open_session(conversation_id, &mut |event| renderer.event(event))
        .await?;
    if !session.status().is_running() {
        renderer.status(session.status());
        return Ok(());
    }

    let status = client.follow(&mut session, &mut renderer).await?;
    renderer.status(status);
    Ok(())
}

/// Session for a loaded conversation with the events its snapshot trails.
async fn caught_up(client: &ChatClient, conversation: Conversation) -> anyhow::Result<ClientSession> {
    let mut session = ClientSession::new(conversation.id, conversation.snapshot, conversation.last_event_id);
    client.catch_up(&mut session, &mut |_| {}).await?;
    Ok(session)
}

async fn show_history(client: &ChatClient, conversation_id: &str) -> anyhow::Result<()> {
    let Some(conversation) = client.conversation(conversation_id).await? else {
        println!("{}", format!("❌ Conversation not found: {}", conversation_id).red());
        return Ok(());
    };

    println!("{}", conversation.title.cyan().bold());
    let session = caught_up(client, conversation).await?;
    for line in history_lines(&session.snapshot().path_messages()?) {
        println!("{}", line);
    }
    Ok(())
}

async fn show_outline(client: &ChatClient, conversation_id: &str) -> anyhow::Result<()> {
    let Some(conversation) = client.conversation(conversation_id).await? else {
        println!("{}", format!("❌ Conversation not found: {}", conversation_id).red());
        return Ok(());
    };

    let session = caught_up(client, conversation).await?;
    let snapshot = session.snapshot();
    let outline = build_outline_tree(&snapshot.messages, snapshot.latest_root_id);
    for line in outline_lines(&outline, &snapshot.current_path) {
        println!("{}", line);
    }
    Ok(())
}

async fn list_conversations(client: &ChatClient, limit: usize, cursor: Option<&str>) -> anyhow::Result<()> {
    let page = client.list(limit, cursor).await?;
    if page.conversations.is_empty() {
        println!("{}", "No conversations".dimmed());
    }
    for summary in &page.conversations {
        println!(
            "{}  {}  {}",
            summary.id.cyan(),
            summary.title,
            format!(
                "({} messages, updated {})",
                summary.message_count,
                summary.updated_at.format("%Y-%m-%d %H:%M")
            )
            .dimmed()
        );
    }
    if let Some(next) = page.next_cursor {
        println!("{}", format!("More: --cursor {}", next).dimmed());
    }
    Ok(())
}

async fn stop(client: &ChatClient, conversation_id: &str) -> anyhow::Result<()> {
    let reply = client.stop(conversation_id).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

async fn edit(
    client: &ChatClient,
    conversation_id: &str,
    depth: usize,
    message_id: MessageId,
    text: &str,
) -> anyhow::Result<()> {
    let mut session = client.open_session(conversation_id, &mut |_| {}).await?;
    let snapshot = session.snapshot();

    if snapshot.get(message_id).map(|m| m.role) != Some(Role::User) {
        bail!("#{} is not a user message", message_id);
    }
    let (edited, message) = snapshot
        .edit_message(depth, message_id, vec![Block::content(text)])
        .ok_or_else(|| anyhow!("#{} is not at depth {} on the active branch", message_id, depth))?;
    println!("{}", format!("✏️  Branched #{} into #{}", message_id, message.id).cyan());

    let request = session.begin_request(edited)?;
    run_request(client, &mut session, request, &mut Renderer::new()).await?;
    Ok(())
}

async fn regenerate(
    client: &ChatClient,
    conversation_id: &str,
    depth: usize,
    message_id: MessageId,
) -> anyhow::Result<()> {
    let mut session = client.open_session(conversation_id, &mut |_| {}).await?;
    let (regenerated, message) = session
        .snapshot()
        .regenerate_message(depth, message_id)
        .ok_or_else(|| {
            anyhow!(
                "#{} is not an assistant message at depth {} on the active branch",
                message_id,
                depth
            )
        })?;
    println!("{}", format!("🔄 Regenerating #{} as #{}", message_id, message.id).cyan());

    let request = session.begin_request(regenerated)?;
    run_request(client, &mut session, request, &mut Renderer::new()).await?;
    Ok(())
}
