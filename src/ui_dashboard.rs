use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use colored::*;
use crossterm::{
    cursor::MoveTo,
    execute,
    terminal::{Clear, ClearType},
};
use log::error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use crate::agent::{PipelineTrace, StudyAgent};
use crate::event_bus::{Event, EventBus, Metrics};
use crate::interpreter::Intent;
use crate::llm_manager::Role;
use crate::session::format_duration;

const CONTENT_WIDTH: usize = 100;
const MAX_LOG_LINES: usize = 6;
const MAX_CHAT_LINES: usize = 8;
const MAX_TOPICS_SHOWN: usize = 5;

/// Quick actions: command name, button label, query prefix.
const QUICK_ACTIONS: &[(&str, &str, &str)] = &[
    ("explain", "📚 Explain", "Explain the concept of"),
    ("summarize", "📝 Summarize", "Summarize the topic of"),
    ("quiz", "❓ Quiz Me", "Quiz me on"),
    ("define", "📖 Define", "Define"),
    ("compare", "⚖️ Compare", "Compare and contrast"),
    ("practice", "✏️ Practice", "Give me practice problems for"),
];

/// A line typed into the dashboard prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardCommand {
    Empty,
    Quit,
    Reset,
    Help,
    Difficulty(String),
    /// Quick action used without a topic; carries the prefix to show as a hint.
    QuickHint(String),
    Query(String),
}

impl DashboardCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return DashboardCommand::Empty;
        }
        let Some(rest) = trimmed.strip_prefix('/') else {
            return DashboardCommand::Query(trimmed.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name.to_lowercase(), arg.trim()),
            None => (rest.to_lowercase(), ""),
        };

        match name.as_str() {
            "quit" | "exit" => DashboardCommand::Quit,
            "reset" => DashboardCommand::Reset,
            "help" => DashboardCommand::Help,
            "difficulty" => DashboardCommand::Difficulty(arg.to_lowercase()),
            _ => match QUICK_ACTIONS.iter().find(|(cmd, _, _)| *cmd == name) {
                Some((_, _, prefix)) if arg.is_empty() => DashboardCommand::QuickHint(prefix.to_string()),
                Some((_, _, prefix)) => DashboardCommand::Query(format!("{} {}", prefix, arg)),
                None => DashboardCommand::Query(trimmed.to_string()),
            },
        }
    }
}

struct ChatEntry {
    role: Role,
    content: String,
}

/// Full-screen terminal dashboard showing the chat and every pipeline stage.
pub struct DashboardUI {
    agent: StudyAgent,
    event_bus: Arc<EventBus>,
    start_time: Instant,
    messages: Vec<ChatEntry>,
    last_trace: Option<PipelineTrace>,

    // Fed by the event listener
    log_lines: Arc<Mutex<VecDeque<String>>>,
    status: Arc<Mutex<String>>,
}

impl DashboardUI {
    pub fn new(agent: StudyAgent, event_bus: Arc<EventBus>) -> Self {
        Self {
            agent,
            event_bus,
            start_time: Instant::now(),
            messages: Vec::new(),
            last_trace: None,
            log_lines: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES))),
            status: Arc::new(Mutex::new("Ready".to_string())),
        }
    }

    /// Start the background event listener.
    ///
    /// The receiver may be subscribed well before the dashboard exists so that
    /// startup log lines are not lost.
    pub fn start(&self, mut receiver: broadcast::Receiver<Event>) {
        let log_lines = self.log_lines.clone();
        let status = self.status.clone();

        tokio::spawn(async move {
            while let Ok(event) = receiver.recv().await {
                Self::apply_event(event, &log_lines, &status);
            }
        });
    }

    fn apply_event(event: Event, log_lines: &Mutex<VecDeque<String>>, status: &Mutex<String>) {
        let set_status = |text: String| {
            if let Ok(mut guard) = status.lock() {
                *guard = text;
            }
        };

        match event {
            Event::LogLine { level, message } => {
                let line = match level.as_str() {
                    "ERROR" => format!("[ERROR] {}", message).red().to_string(),
                    "WARN" => format!("[WARN ] {}", message).yellow().to_string(),
                    "INFO" => format!("[INFO ] {}", message).cyan().to_string(),
                    "DEBUG" => format!("[DEBUG] {}", message).white().to_string(),
                    _ => format!("[{}] {}", level, message).dimmed().to_string(),
                };
                if let Ok(mut logs) = log_lines.lock() {
                    if logs.len() >= MAX_LOG_LINES {
                        logs.pop_front();
                    }
                    logs.push_back(line);
                }
            }
            Event::APICallStarted { provider, model } => set_status(format!("Calling {}/{}", provider, model)),
            Event::APIError { error, .. } => set_status(format!("❌ {}", error)),
            Event::DifficultyChanged { level } => set_status(format!("Difficulty set to: {}", level)),
            Event::SessionReset { .. } => set_status("🔄 Session reset".to_string()),
            _ => {}
        }
    }

    fn set_status(&self, text: impl Into<String>) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = text.into();
        }
    }

    pub async fn run(&mut self, receiver: broadcast::Receiver<Event>) -> Result<()> {
        self.start(receiver);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            self.render().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };

            match DashboardCommand::parse(&line) {
                DashboardCommand::Empty => {}
                DashboardCommand::Quit => break,
                DashboardCommand::Reset => {
                    self.agent.reset().await;
                    self.messages.clear();
                    self.last_trace = None;
                }
                DashboardCommand::Help => self.set_status(help_text()),
                DashboardCommand::Difficulty(level) => {
                    let confirmation = self.agent.set_difficulty(&level).await;
                    self.set_status(confirmation);
                }
                DashboardCommand::QuickHint(prefix) => {
                    self.set_status(format!("Type your topic after: '{}'", prefix));
                }
                DashboardCommand::Query(query) => {
                    self.set_status("🤔 Thinking...");
                    self.render().await?;
                    self.handle_query(query).await;
                }
            }
        }

        self.finish();
        Ok(())
    }

    /// Process one query; failures end up in the status line and the loop keeps going.
    async fn handle_query(&mut self, query: String) {
        match self.agent.process_query(&query).await {
            Ok(outcome) => {
                self.messages.push(ChatEntry { role: Role::User, content: query });
                self.messages.push(ChatEntry {
                    role: Role::Assistant,
                    content: outcome.raw_response,
                });
                self.last_trace = Some(outcome.trace);
                self.set_status("✅ Response ready");
            }
            Err(e) => {
                error!("Turn failed: {:#}", e);
                self.set_status(format!("❌ {:#}", e));
            }
        }
    }

    async fn render(&self) -> Result<()> {
        let metrics = self.event_bus.get_metrics().await;
        let mut stdout = io::stdout();
        execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
        for line in self.render_lines(&metrics) {
            println!("{}", line);
        }
        print!("{} ", "📝 You:".bright_white().bold());
        stdout.flush()?;
        Ok(())
    }

    fn render_lines(&self, metrics: &Metrics) -> Vec<String> {
        let mut out = Vec::new();
        let rule = |left: &str, right: &str| format!("{}{}{}", left, "═".repeat(CONTENT_WIDTH + 2), right).bright_blue().to_string();

        // Header
        let elapsed = self.start_time.elapsed().as_secs();
        out.push(rule("╔", "╗"));
        let title = "🎓 AI Study Buddy Agent";
        let time_str = format!("{}:{:02}", elapsed / 60, elapsed % 60);
        let gap = CONTENT_WIDTH.saturating_sub(visible_len(title) + time_str.len());
        out.push(boxed(&format!("{}{}{}", title.bright_white().bold(), " ".repeat(gap), time_str)));
        out.push(rule("╠", "╣"));

        // Chat
        out.push(boxed(&"💬 Chat".bright_white().bold().to_string()));
        let start = self.messages.len().saturating_sub(MAX_CHAT_LINES);
        if self.messages.is_empty() {
            out.push(boxed(&"Ask me anything about your studies...".dimmed().to_string()));
        }
        for entry in &self.messages[start..] {
            let (who, colored_who) = match entry.role {
                Role::User => ("You: ", "You: ".green().bold()),
                _ => ("Buddy: ", "Buddy: ".cyan().bold()),
            };
            let first_line = entry.content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            let text = truncate(first_line, CONTENT_WIDTH - who.len());
            out.push(boxed(&format!("{}{}", colored_who, text)));
        }
        out.push(rule("╠", "╣"));

        // Pipeline
        out.push(boxed(&"🔍 Agent Pipeline".bright_white().bold().to_string()));
        match &self.last_trace {
            Some(trace) => out.extend(pipeline_lines(trace).iter().map(|l| boxed(l))),
            None => out.push(boxed("💡 Send a message to see the agent pipeline in action!")),
        }
        out.push(rule("╠", "╣"));

        // Session
        let summary = self.agent.session_summary();
        let session = self.agent.session();
        out.push(boxed(&format!(
            "{} {}",
            "📊 Session Info".bright_white().bold(),
            format!(
                "(id {}, started {})",
                session.id.get(..8).unwrap_or(session.id.as_str()),
                session.started_at().format("%H:%M:%S")
            )
            .dimmed()
        )));
        out.push(boxed(&format!(
            "Difficulty: {} | Interactions: {} | Topics Covered: {} | Duration: {}",
            summary.difficulty_level.to_string().yellow(),
            summary.total_interactions.to_string().cyan(),
            summary.topics_covered.len().to_string().cyan(),
            format_duration(summary.session_duration),
        )));
        out.push(boxed(&format!(
            "API Calls: {} | Tokens: {} | Errors: {}",
            metrics.total_api_calls.to_string().yellow(),
            metrics.total_tokens.to_string().magenta(),
            metrics.api_errors.to_string().red(),
        )));
        let topic_start = summary.topics_covered.len().saturating_sub(MAX_TOPICS_SHOWN);
        for topic in &summary.topics_covered[topic_start..] {
            out.push(boxed(&format!("  • {}", truncate(topic, 50))));
        }
        out.push(rule("╠", "╣"));

        // Status and logs
        let status = self.status.lock().map(|s| s.clone()).unwrap_or_default();
        let status_colored = if status.starts_with('✅') {
            status.green()
        } else if status.starts_with('❌') {
            status.red()
        } else {
            status.white()
        };
        out.push(boxed(&format!(
            "{}{}",
            "Status: ".bright_white(),
            truncate(&status_colored.to_string(), CONTENT_WIDTH - 8)
        )));
        let logs = self.log_lines.lock().map(|l| l.clone()).unwrap_or_default();
        for log_line in logs.iter() {
            out.push(boxed(log_line));
        }
        out.push(rule("╠", "╣"));

        let quick: Vec<String> = QUICK_ACTIONS.iter().map(|(cmd, label, _)| format!("{} /{}", label, cmd)).collect();
        out.push(boxed(&format!("⚡ {}", quick.join("  ")).dimmed().to_string()));
        out.push(boxed(&"/difficulty <level>  /reset  /help  /quit".dimmed().to_string()));
        out.push(rule("╚", "╝"));
        out
    }

    pub fn finish(&self) {
        let summary = self.agent.session_summary();
        println!("\n{}", "=".repeat(CONTENT_WIDTH).bright_blue());
        println!("{}", "📊 Session Summary".bright_white().bold());
        println!("{}", summary);
        println!("\n👋 Goodbye! Happy studying!");
    }
}

fn pipeline_lines(trace: &PipelineTrace) -> Vec<String> {
    let mut lines = Vec::new();

    let intent = trace.input.intent;
    lines.push(format!(
        "🧠 Input Understanding: {} {}",
        intent_marker(intent),
        intent.as_str().to_uppercase().bold()
    ));
    let analysis = match &trace.input.analysis {
        Some(text) => text.split_whitespace().collect::<Vec<_>>().join(" "),
        None => "(analysis disabled)".to_string(),
    };
    lines.push(format!("   Parsed Analysis: {}", truncate(&analysis, CONTENT_WIDTH - 20)));

    let state = &trace.state;
    lines.push(format!(
        "📍 State Tracker: difficulty {} | interactions {} | topics {}",
        state.difficulty, state.interaction_count, state.topics_covered.len()
    ));

    lines.push(format!("📋 Task Planner: `{}`", trace.plan.task_type));
    for (i, step) in trace.plan.steps.iter().enumerate() {
        lines.push(format!("   {}. {}", i + 1, step));
    }

    lines.push(format!(
        "✨ Output Generator: context messages {} | response length {} chars",
        trace.output.context_used, trace.output.response_length
    ));
    lines
}

fn intent_marker(intent: Intent) -> &'static str {
    match intent {
        Intent::Explain => "🟢",
        Intent::Summarize => "🔵",
        Intent::Quiz => "🟡",
        Intent::Define => "🟣",
        Intent::Compare => "🟠",
        Intent::Practice => "🔴",
        Intent::General => "⚪",
    }
}

fn help_text() -> String {
    let quick: Vec<&str> = QUICK_ACTIONS.iter().map(|(cmd, _, _)| *cmd).collect();
    format!(
        "Type a question, or /{} <topic>, /difficulty <level>, /reset, /quit",
        quick.join(" /")
    )
}

/// Pad a line to the box width and add the side borders.
fn boxed(content: &str) -> String {
    let padding = CONTENT_WIDTH.saturating_sub(visible_len(content));
    format!("{} {}{} {}", "║".bright_blue(), content, " ".repeat(padding), "║".bright_blue())
}

fn visible_len(s: &str) -> usize {
    strip_ansi_codes(s).chars().count()
}

/// Shorten to at most `max` visible characters, ending with "..." when cut.
fn truncate(s: &str, max: usize) -> String {
    let visible = strip_ansi_codes(s);
    if visible.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = visible.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn strip_ansi_codes(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            // Skip until 'm'
            for nc in chars.by_ref() {
                if nc == 'm' {
                    break;
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
