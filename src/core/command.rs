// src/core/command.rs - Command classification for inbound chat text

use thiserror::Error;

/// Every inbound text maps to exactly one of these, or to a `ClassifyError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Free text with no recognized prefix.
    Chat(String),
    /// `/ask <prompt>`
    Ask(String),
    /// `/run <shell command>`
    Run(String),
    /// `/file <path>`
    File(String),
    /// `/screen`
    Screen,
    /// `/status`
    Status,
    /// `/history [N]`
    History(Option<usize>),
    /// `/clear`
    Clear,
    /// `/help`, `/start`
    Help,
    /// `/ls [path]`
    Ls(Option<String>),
    /// `/view <path>`
    View(String),
    /// `/project [path]`
    Project(Option<String>),
    /// `/edit <path> <instructions>`: propose an AI rewrite of a file.
    Edit { path: String, instructions: String },
    /// `/create <path> <description>`: propose a new AI-generated file.
    Create { path: String, description: String },
    /// `/task <description>`: propose a step-by-step plan.
    Task(String),
    /// `✅` or `/approve`: carry out the pending proposal.
    Approve,
    /// `❌` or `/cancel`: drop the pending proposal.
    Reject,
}

impl Command {
    /// Short label used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Chat(_) => "chat",
            Command::Ask(_) => "ask",
            Command::Run(_) => "run",
            Command::File(_) => "file",
            Command::Screen => "screen",
            Command::Status => "status",
            Command::History(_) => "history",
            Command::Clear => "clear",
            Command::Help => "help",
            Command::Ls(_) => "ls",
            Command::View(_) => "view",
            Command::Project(_) => "project",
            Command::Edit { .. } => "edit",
            Command::Create { .. } => "create",
            Command::Task(_) => "task",
            Command::Approve => "approve",
            Command::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("Empty message")]
    EmptyMessage,

    #[error("Usage: `{usage}`")]
    MissingArgument { command: &'static str, usage: &'static str },

    #[error("Usage: `{usage}` ({reason})")]
    InvalidArgument {
        command: &'static str,
        usage: &'static str,
        reason: String,
    },
}

/// Classify inbound text. Pure and total.
pub fn classify(text: &str) -> Result<Command, ClassifyError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ClassifyError::EmptyMessage);
    }

    match trimmed {
        "✅" => return Ok(Command::Approve),
        "❌" => return Ok(Command::Reject),
        _ => {}
    }

    let Some((token, rest)) = split_command(trimmed) else {
        return Ok(Command::Chat(trimmed.to_string()));
    };
    let arg = rest.trim();

    let command = match token {
        "ask" => Command::Ask(required(arg, "ask", "/ask <prompt>")?),
        "run" => Command::Run(required(arg, "run", "/run <command>")?),
        "file" => Command::File(required(arg, "file", "/file <path>")?),
        "view" => Command::View(required(arg, "view", "/view <path>")?),
        "screen" => Command::Screen,
        "status" => Command::Status,
        "clear" => Command::Clear,
        "help" | "start" => Command::Help,
        "history" => Command::History(history_count(arg)?),
        "ls" => Command::Ls(optional(arg)),
        "project" => Command::Project(optional(arg)),
        "edit" => {
            let (path, instructions) = path_and_text(arg, "edit", "/edit <path> <instructions>")?;
            Command::Edit { path, instructions }
        }
        "create" => {
            let (path, description) = path_and_text(arg, "create", "/create <path> <description>")?;
            Command::Create { path, description }
        }
        "task" => Command::Task(required(arg, "task", "/task <description>")?),
        "approve" => Command::Approve,
        "cancel" => Command::Reject,
        // Unknown slash commands are ordinary chat text.
        _ => Command::Chat(trimmed.to_string()),
    };

    Ok(command)
}

/// Split `/name[@bot] rest` into (`name`, `rest`). `None` when the text has no slash prefix.
fn split_command(text: &str) -> Option<(&str, &str)> {
    let body = text.strip_prefix('/')?;
    let end = body.find(char::is_whitespace).unwrap_or(body.len());
    let (token, rest) = body.split_at(end);
    let name = token.split_once('@').map_or(token, |(n, _)| n);
    if name.is_empty() {
        return None;
    }
    Some((name, rest))
}

fn required(arg: &str, command: &'static str, usage: &'static str) -> Result<String, ClassifyError> {
    if arg.is_empty() {
        Err(ClassifyError::MissingArgument { command, usage })
    } else {
        Ok(arg.to_string())
    }
}

/// First whitespace-separated word as a path, the rest as free text. Both are required.
fn path_and_text(
    arg: &str,
    command: &'static str,
    usage: &'static str,
) -> Result<(String, String), ClassifyError> {
    let (path, text) = arg.split_once(char::is_whitespace).unwrap_or((arg, ""));
    let text = text.trim();
    if path.is_empty() || text.is_empty() {
        return Err(ClassifyError::MissingArgument { command, usage });
    }
    Ok((path.to_string(), text.to_string()))
}

fn optional(arg: &str) -> Option<String> {
    (!arg.is_empty()).then(|| arg.to_string())
}

fn history_count(arg: &str) -> Result<Option<usize>, ClassifyError> {
    if arg.is_empty() {
        return Ok(None);
    }
    arg.parse::<usize>()
        .map(Some)
        .map_err(|_| ClassifyError::InvalidArgument {
            command: "history",
            usage: "/history [N]",
            reason: format!("'{arg}' is not a number"),
        })
}
