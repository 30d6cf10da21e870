use std::fmt::Display;
use std::io::{self, Write};

use colored::Colorize;

use chat_core::{Block, Message, MessageId, OutlineNode, OutlineTree, ResearchItem, Role};
use chat_state::{ChatStatus, StreamEvent};

/// Terminal output for live events.
#[derive(Default)]
pub struct Renderer {
    /// A content delta was printed without a trailing newline.
    mid_line: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn end_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }

    pub fn event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Content { text } => {
                print!("{}", text.green());
                let _ = io::stdout().flush();
                self.mid_line = !text.ends_with('\n');
            }
            StreamEvent::Thinking { text } => {
                self.end_line();
                println!("{}", format!("💭 {}", text).dimmed());
            }
            StreamEvent::ToolCall { tool, args, .. } => {
                self.end_line();
                println!("{}", format!("🔧 Executing tool: {}", tool).yellow());
                println!("{}", format!("   Args: {}", args).dimmed());
            }
            StreamEvent::ToolProgress {
                stage,
                message,
                received_bytes,
                total_bytes,
                ..
            } => {
                self.end_line();
                println!(
                    "{}",
                    format!("   [{}] {}{}", stage, message, byte_progress(*received_bytes, *total_bytes))
                        .dimmed()
                );
            }
            StreamEvent::ToolResult { result, .. } => {
                self.end_line();
                let text = match result {
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                println!("{}", format!("✅ Tool result: {}", text).green());
            }
            StreamEvent::Error { message } => {
                self.end_line();
                println!("{}", format!("❌ Error: {}", message).red());
            }
            StreamEvent::ConversationCreated { conversation } => {
                self.end_line();
                println!("{}", format!("📁 Conversation: {}", conversation.id).dimmed());
            }
            StreamEvent::ConversationUpdated { .. } => {}
        }
    }

    pub fn status(&mut self, status: ChatStatus) {
        self.end_line();
        let line = format!("── {} ──", status);
        match status {
            ChatStatus::Completed => println!("{}", line.cyan()),
            ChatStatus::Error => println!("{}", line.red()),
            _ => println!("{}", line.yellow()),
        }
    }

    /// A frame that could not be applied. Events already applied stay.
    pub fn protocol_error(&mut self, error: &dyn Display) {
        self.end_line();
        eprintln!("{}: {}", "Protocol error".red().bold(), error);
    }

    pub fn transport_error(&mut self, error: &str) {
        self.end_line();
        eprintln!("{}: {}", "SSE error".red(), error);
    }
}

fn byte_progress(received: Option<u64>, total: Option<u64>) -> String {
    match (received, total) {
        (Some(received), Some(total)) => format!(" ({}/{} bytes)", received, total),
        (Some(received), None) => format!(" ({} bytes)", received),
        _ => String::new(),
    }
}

/// One line per message on the active path, prefixed with its depth.
pub fn history_lines(path: &[Message]) -> Vec<String> {
    path.iter()
        .enumerate()
        .map(|(index, message)| {
            let speaker = match message.role {
                Role::User => "You",
                Role::Assistant => "Assistant",
            };
            format!("{:>3} #{} {}: {}", index + 1, message.id, speaker, message_summary(message))
        })
        .collect()
}

fn message_summary(message: &Message) -> String {
    let mut parts = Vec::new();
    for block in &message.blocks {
        match block {
            Block::Content { text } => parts.push(text.clone()),
            Block::Attachments { attachments } => {
                parts.push(format!("[{} attachment(s)]", attachments.len()))
            }
            Block::Research { items } => {
                let tools: Vec<&str> = items
                    .iter()
                    .filter_map(|item| match item {
                        ResearchItem::Tool { call, .. } => Some(call.name.as_str()),
                        ResearchItem::Thinking { .. } => None,
                    })
                    .collect();
                if !tools.is_empty() {
                    parts.push(format!("[tools: {}]", tools.join(", ")));
                }
            }
            Block::Error { message } => parts.push(format!("[error: {}]", message)),
        }
    }
    parts.join(" ")
}

/// Indented outline, with `*` on nodes of the active path.
pub fn outline_lines(outline: &OutlineTree, current_path: &[MessageId]) -> Vec<String> {
    let mut lines = Vec::new();
    for root in &outline.roots {
        push_outline(&mut lines, root, 0, current_path);
    }
    lines
}

fn push_outline(lines: &mut Vec<String>, node: &OutlineNode, indent: usize, current_path: &[MessageId]) {
    let marker = if current_path.contains(&node.message_id) { "*" } else { " " };
    let role = match node.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let siblings = if node.sibling_count > 1 {
        format!(" ({}/{})", node.sibling_index, node.sibling_count)
    } else {
        String::new()
    };
    lines.push(format!(
        "{}{} #{} {}{}: {}",
        "  ".repeat(indent),
        marker,
        node.message_id,
        role,
        siblings,
        node.preview
    ));
    for child in &node.children {
        push_outline(lines, child, indent + 1, current_path);
    }
}
