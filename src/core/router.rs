// src/core/router.rs - Maps each command to its handler
//
// The router owns the session store and the project directory. Every
// transcript mutation happens here, one command at a time.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::command::Command;
use super::reply::Reply;
use crate::actions::files::FileAccess;
use crate::actions::proposal::{self, PendingAction};
use crate::actions::screen::{OsScreenCapture, ScreenCapture};
use crate::actions::shell::{self, OsShell, ShellExecutor, ShellOutput};
use crate::actions::{history, status};
use crate::infra::config::Config;
use crate::infra::errors::BridgeError;
use crate::integrations::types::Attachment;
use crate::provider::{ChatRequest, Message, ModelProvider};
use crate::security::{AllowedRoot, CommandBlocklist};
use crate::session::{Role, SessionStore, Turn};
use crate::util::preview;

/// Generic notice for a failed session write.
pub const PERSISTENCE_NOTICE: &str =
    "❌ Internal error: the session log could not be written. Please try again.";
const NOTE_PREVIEW_BYTES: usize = 500;

pub const HELP_TEXT: &str = "🤖 *deskrelay*\n\n\
💬 *AI chat*\n\
Just type anything and Gemini responds\n\
`/ask <prompt>` explicit query\n\
`/clear` start a fresh session\n\
`/history [N]` session summary, optionally the last N turns\n\n\
📂 *Files*\n\
`/view <path>` show a text file\n\
`/ls [path]` list a directory\n\
`/file <path>` download a file\n\
`/project [path]` show or set the working directory\n\n\
✏️ *AI changes* (reply ✅ to apply, ❌ to cancel)\n\
`/edit <path> <instructions>` propose an edit\n\
`/create <path> <description>` propose a new file\n\
`/task <description>` plan a multi-step task\n\n\
🖥 *Machine*\n\
`/run <cmd>` run a shell command\n\
`/screen` take a screenshot\n\
`/status` health check\n\n\
📝 Every session is saved as markdown for IDE continuity.";

/// Handles one classified command and produces the reply to send.
#[async_trait]
pub trait Route: Send {
    async fn route(&mut self, command: Command) -> Reply;
}

/// Router settings derived from the config.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub model: String,
    pub system_prompt: String,
    pub context_turns: usize,
    pub shell_timeout: Duration,
    pub max_output_chars: usize,
    pub require_approval: bool,
}

impl RouterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.gemini.model.clone(),
            system_prompt: config.gemini.system_prompt.clone(),
            context_turns: config.gemini.context_turns,
            shell_timeout: Duration::from_secs(config.shell.timeout_secs),
            max_output_chars: config.shell.max_output_chars,
            require_approval: config.files.require_approval,
        }
    }
}

pub struct ActionRouter {
    store: SessionStore,
    provider: Arc<dyn ModelProvider>,
    shell: Arc<dyn ShellExecutor>,
    screen: Arc<dyn ScreenCapture>,
    files: FileAccess,
    blocklist: CommandBlocklist,
    project_dir: PathBuf,
    settings: RouterSettings,
    started_at: Instant,
    /// Proposal awaiting ✅ or ❌. A newer proposal replaces it.
    pending: Option<PendingAction>,
}

impl ActionRouter {
    /// Build a router whose local actions use the OS implementations.
    pub fn from_config(
        store: SessionStore,
        provider: Arc<dyn ModelProvider>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            provider,
            shell: Arc::new(OsShell::new(config.shell.program.clone())),
            screen: Arc::new(OsScreenCapture::new(
                config.screen.command.clone(),
                Duration::from_secs(config.screen.timeout_secs),
            )),
            files: FileAccess::new(AllowedRoot::new(config.files.allowed_root()), &config.files),
            blocklist: CommandBlocklist::new(&config.shell.blocked),
            project_dir: config.files.project_dir(),
            settings: RouterSettings::from_config(config),
            started_at: Instant::now(),
            pending: None,
        }
    }

    pub fn with_shell(mut self, shell: Arc<dyn ShellExecutor>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_screen(mut self, screen: Arc<dyn ScreenCapture>) -> Self {
        self.screen = screen;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Hand the store back for shutdown.
    pub fn into_store(self) -> SessionStore {
        self.store
    }

    /// Append a system note. A write failure is reported in the reply.
    fn note(&mut self, text: String, reply: &mut Reply) {
        if let Err(e) = self.store.append(Turn::system(text)) {
            tracing::error!("Failed to record note: {}", e);
            reply.push_text(PERSISTENCE_NOTICE);
        }
    }

    async fn chat(&mut self, prompt: String) -> Reply {
        let mut messages: Vec<Message> = self
            .store
            .current_transcript()
            .recent_dialogue(self.settings.context_turns)
            .into_iter()
            .map(|t| match t.role {
                Role::Assistant => Message::assistant(t.text.clone()),
                _ => Message::user(t.text.clone()),
            })
            .collect();

        if let Err(e) = self.store.append(Turn::user(prompt.clone())) {
            tracing::error!("Failed to record user turn, skipping completion: {}", e);
            return Reply::text(PERSISTENCE_NOTICE);
        }

        messages.push(Message::user(prompt));
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages,
            system: Some(self.settings.system_prompt.clone()),
            ..Default::default()
        };

        match self.provider.chat(request).await {
            Ok(response) => {
                let mut reply = Reply::text(response.content.clone());
                if let Err(e) = self.store.append(Turn::assistant(response.content)) {
                    tracing::error!("Failed to record assistant turn: {}", e);
                    reply.push_text(PERSISTENCE_NOTICE);
                }
                reply
            }
            Err(e) => {
                tracing::warn!("Completion failed: {}", e);
                Reply::text(format!("❌ AI error: {e}"))
            }
        }
    }

    /// One-off completion outside the conversation context.
    async fn complete(&self, prompt: String) -> Result<String, Reply> {
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![Message::user(prompt)],
            system: Some(self.settings.system_prompt.clone()),
            ..Default::default()
        };
        match self.provider.chat(request).await {
            Ok(response) => Ok(response.content),
            Err(e) => {
                tracing::warn!("Completion failed: {}", e);
                Err(Reply::text(format!("❌ AI error: {e}")))
            }
        }
    }

    async fn run(&mut self, command: String) -> Reply {
        if let Some(pattern) = self.blocklist.matched(&command) {
            tracing::warn!("Blocked shell command (pattern {:?}): {}", pattern, command);
            return error_reply(&BridgeError::local(
                "run",
                format!("blocked by the safety blocklist (`{pattern}`)"),
            ));
        }

        tracing::info!("Executing: {}", command);
        let output = match self
            .shell
            .run(&command, &self.project_dir, self.settings.shell_timeout)
            .await
        {
            Ok(output) => output,
            Err(e) => return error_reply(&e),
        };

        let mut reply = Reply::text(shell::render_run_result(
            &command,
            &output,
            self.settings.shell_timeout,
            self.settings.max_output_chars,
        ));
        self.note(run_note(&command, &output), &mut reply);
        reply
    }

    async fn file(&mut self, path: String) -> Reply {
        match self.files.load(&path, &self.project_dir).await {
            Ok((resolved, attachment)) => {
                let note = format!(
                    "Sent file `{}` ({} bytes)",
                    resolved.display(),
                    attachment.bytes.len()
                );
                let mut reply = Reply::document(attachment);
                self.note(note, &mut reply);
                reply
            }
            Err(e) => error_reply(&e),
        }
    }

    async fn screen(&mut self) -> Reply {
        match self.screen.capture().await {
            Ok(bytes) => {
                let mut reply = Reply::photo(Attachment {
                    file_name: "screenshot.png".into(),
                    bytes,
                    caption: Some("🖥 Screenshot".into()),
                });
                self.note("Screenshot captured".into(), &mut reply);
                reply
            }
            Err(e) => error_reply(&e),
        }
    }

    async fn status(&self) -> Reply {
        let session = self.store.current();
        let report = status::collect(
            self.started_at.elapsed(),
            &self.project_dir,
            &session.id,
            self.store.current_transcript().len(),
        )
        .await;
        Reply::text(report.render())
    }

    fn history(&self, last: Option<usize>) -> Reply {
        Reply::text(history::summarize(
            self.store.current(),
            self.store.current_transcript(),
            last,
        ))
    }

    fn clear(&mut self) -> Reply {
        let previous = self.store.current().id.clone();
        self.store.set_project_dir(self.project_dir.clone());
        match self.store.rotate() {
            Ok(_) => Reply::text(format!(
                "🗑 Session cleared. Starting fresh.\nPrevious session saved as `{previous}`."
            )),
            Err(e) => {
                tracing::error!("Session rotation failed: {}", e);
                Reply::text(format!(
                    "❌ Could not start a new session; the current one is unchanged. ({e})"
                ))
            }
        }
    }

    async fn ls(&mut self, path: Option<String>) -> Reply {
        match self.files.list(path.as_deref(), &self.project_dir).await {
            Ok(listing) => {
                let mut reply = Reply::text(listing.render());
                let note = format!(
                    "Listed `{}` ({} entries)",
                    listing.path.display(),
                    listing.total
                );
                self.note(note, &mut reply);
                reply
            }
            Err(e) => error_reply(&e),
        }
    }

    async fn view(&mut self, path: String) -> Reply {
        match self.files.view(&path, &self.project_dir).await {
            Ok(view) => {
                let mut reply = Reply::text(view.render());
                let note = format!("Viewed `{}` ({} lines)", view.path.display(), view.line_count);
                self.note(note, &mut reply);
                reply
            }
            Err(e) => error_reply(&e),
        }
    }

    async fn project(&mut self, path: Option<String>) -> Reply {
        let Some(path) = path else {
            return Reply::text(format!(
                "📁 Current project: `{}`",
                self.project_dir.display()
            ));
        };

        match self.files.project_dir(&path, &self.project_dir).await {
            Ok(dir) => {
                tracing::info!("Project set to {}", dir.display());
                self.project_dir = dir.clone();
                self.store.set_project_dir(dir.clone());
                let mut reply = Reply::text(format!("📍 Project set to: `{}`", dir.display()));
                self.note(format!("Project set to `{}`", dir.display()), &mut reply);
                reply
            }
            Err(e) => error_reply(&e),
        }
    }
}

impl ActionRouter {
    async fn propose_edit(&mut self, path: String, instructions: String) -> Reply {
        let (resolved, original) = match self.files.read_text("edit", &path, &self.project_dir).await {
            Ok(found) => found,
            Err(e) => return error_reply(&e),
        };

        let prompt = proposal::edit_prompt(&resolved, &instructions, &original);
        let new_content = match self.complete(prompt).await {
            Ok(content) => with_trailing_newline(proposal::strip_code_fences(&content), &original),
            Err(reply) => return reply,
        };

        let diff = proposal::unified_diff(&original, &new_content, &proposal::display_name(&resolved));
        if diff.is_empty() {
            return Reply::text("ℹ️ No changes needed, the file already matches.");
        }

        self.propose(PendingAction::Edit {
            path: resolved,
            original,
            new_content,
            diff,
            instructions,
        })
        .await
    }

    async fn propose_create(&mut self, path: String, description: String) -> Reply {
        let resolved = match self.files.resolve("create", &path, &self.project_dir) {
            Ok(resolved) => resolved,
            Err(e) => return error_reply(&e),
        };
        if tokio::fs::symlink_metadata(&resolved).await.is_ok() {
            return Reply::text(format!(
                "⚠️ File already exists: `{}`\nUse `/edit` to modify it, or choose a different name.",
                resolved.display()
            ));
        }

        let prompt = proposal::create_prompt(&resolved, &description);
        let content = match self.complete(prompt).await {
            Ok(content) => with_trailing_newline(proposal::strip_code_fences(&content), "\n"),
            Err(reply) => return reply,
        };

        self.propose(PendingAction::Create {
            path: resolved,
            content,
            description,
        })
        .await
    }

    async fn propose_task(&mut self, description: String) -> Reply {
        let entries: Vec<String> = match self.files.list(None, &self.project_dir).await {
            Ok(listing) => listing
                .entries
                .into_iter()
                .map(|e| if e.is_dir { format!("{}/", e.name) } else { e.name })
                .collect(),
            Err(e) => {
                tracing::debug!("Task planning without a listing: {}", e);
                Vec::new()
            }
        };

        let prompt = proposal::plan_prompt(&description, &self.project_dir, &entries);
        let plan = match self.complete(prompt).await {
            Ok(plan) => plan.trim().to_string(),
            Err(reply) => return reply,
        };

        self.propose(PendingAction::Task { description, plan }).await
    }

    /// Park the proposal for approval, or carry it out when approval is off.
    async fn propose(&mut self, action: PendingAction) -> Reply {
        if !self.settings.require_approval {
            return self.execute(action).await;
        }

        let mut reply = Reply::text(action.preview());
        let note = match &action {
            PendingAction::Edit { path, instructions, .. } => {
                format!("Proposed edit to `{}`: {instructions}", path.display())
            }
            PendingAction::Create { path, description, .. } => {
                format!("Proposed new file `{}`: {description}", path.display())
            }
            PendingAction::Task { description, plan } => {
                format!("Planned task: {description}\n\n{}", preview(plan, NOTE_PREVIEW_BYTES))
            }
        };
        if let Some(replaced) = self.pending.replace(action) {
            tracing::info!("Discarding unanswered {} proposal", replaced.kind());
        }
        self.note(note, &mut reply);
        reply
    }

    async fn execute(&mut self, action: PendingAction) -> Reply {
        match action {
            PendingAction::Edit {
                path,
                original,
                new_content,
                ..
            } => {
                // Symlinks may have moved since the proposal.
                if let Err(e) = self.files.root().check("edit", &path) {
                    return error_reply(&e);
                }
                match proposal::apply_edit(&path, &original, &new_content).await {
                    Ok(backup) => {
                        let name = proposal::display_name(&path);
                        let mut reply = Reply::text(format!(
                            "✅ *Edit applied* to `{name}`\nBackup saved as `{}`",
                            proposal::display_name(&backup)
                        ));
                        self.note(format!("Applied edit to `{}`", path.display()), &mut reply);
                        reply
                    }
                    Err(e) => error_reply(&e),
                }
            }
            PendingAction::Create { path, content, .. } => {
                if let Err(e) = self.files.root().check("create", &path) {
                    return error_reply(&e);
                }
                match proposal::create_file(&path, &content).await {
                    Ok(()) => {
                        let mut reply = Reply::text(format!(
                            "✅ *Created* `{}`",
                            proposal::display_name(&path)
                        ));
                        self.note(
                            format!("Created `{}` ({} bytes)", path.display(), content.len()),
                            &mut reply,
                        );
                        reply
                    }
                    Err(e) => error_reply(&e),
                }
            }
            PendingAction::Task { description, plan } => {
                let prompt = proposal::execute_prompt(&plan, &self.project_dir);
                let result = match self.complete(prompt).await {
                    Ok(result) => result,
                    Err(reply) => return reply,
                };
                let mut reply = Reply::text(format!(
                    "{result}\n\n📝 *Task complete.* Results logged for IDE continuity.\n\
                     Use `/view`, `/edit`, or `/run` to follow up on individual steps."
                ));
                self.note(
                    format!("Executed task: {description}\n\n{}", preview(&result, NOTE_PREVIEW_BYTES)),
                    &mut reply,
                );
                reply
            }
        }
    }

    async fn approve(&mut self) -> Reply {
        match self.pending.take() {
            Some(action) => {
                tracing::info!("Approved {} proposal", action.kind());
                self.execute(action).await
            }
            None => Reply::text("ℹ️ No pending action to approve."),
        }
    }

    fn reject(&mut self) -> Reply {
        let Some(action) = self.pending.take() else {
            return Reply::text("ℹ️ No pending action to cancel.");
        };
        let kind = action.kind();
        let mut reply = Reply::text(format!("🚫 {} cancelled.", capitalized(kind)));
        self.note(format!("Cancelled proposed {kind}"), &mut reply);
        reply
    }
}

/// Fence stripping drops the final newline; restore it when `reference` had one.
fn with_trailing_newline(mut text: String, reference: &str) -> String {
    if reference.ends_with('\n') && !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn error_reply(err: &BridgeError) -> Reply {
    Reply::text(format!("❌ {err}"))
}

fn run_note(command: &str, output: &ShellOutput) -> String {
    let status = if output.timed_out {
        "timed out".to_string()
    } else {
        match output.exit_code {
            Some(code) => format!("exit {code}"),
            None => "killed".to_string(),
        }
    };
    let combined = if output.stdout.trim().is_empty() {
        output.stderr.trim()
    } else {
        output.stdout.trim()
    };
    let shown = if combined.is_empty() {
        "(no output)".to_string()
    } else {
        preview(combined, NOTE_PREVIEW_BYTES)
    };
    format!("Ran `{command}` ({status})\n\n```\n{shown}\n```")
}

#[async_trait]
impl Route for ActionRouter {
    async fn route(&mut self, command: Command) -> Reply {
        match command {
            Command::Chat(prompt) | Command::Ask(prompt) => self.chat(prompt).await,
            Command::Run(cmd) => self.run(cmd).await,
            Command::File(path) => self.file(path).await,
            Command::Screen => self.screen().await,
            Command::Status => self.status().await,
            Command::History(last) => self.history(last),
            Command::Clear => self.clear(),
            Command::Help => Reply::text(HELP_TEXT),
            Command::Ls(path) => self.ls(path).await,
            Command::View(path) => self.view(path).await,
            Command::Project(path) => self.project(path).await,
            Command::Edit { path, instructions } => self.propose_edit(path, instructions).await,
            Command::Create { path, description } => self.propose_create(path, description).await,
            Command::Task(description) => self.propose_task(description).await,
            Command::Approve => self.approve().await,
            Command::Reject => self.reject(),
        }
    }
}
