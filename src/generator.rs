use anyhow::{Context, Result};
use log::info;

use crate::llm_manager::{ChatMessage, CompletionRequest, LLMManager};
use crate::planner::Plan;
use crate::session::Interaction;

/// Prior turns replayed to the model as chat history.
pub const HISTORY_TURNS: usize = 3;

const HEADER_RULE_WIDTH: usize = 40;
const FALLBACK_HEADER: &str = "💡 Response";

/// Turns a plan into model output and decorates it for display.
pub struct OutputGenerator {
    system_prompt: String,
    history_turns: usize,
}

impl OutputGenerator {
    pub fn new() -> Self {
        Self {
            system_prompt: Self::default_system_prompt(),
            history_turns: HISTORY_TURNS,
        }
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// System instruction, then prior user/assistant pairs, then the plan prompt.
    pub fn build_messages(&self, plan: &Plan, context: &[Interaction]) -> Vec<ChatMessage> {
        let start = context.len().saturating_sub(self.history_turns);
        let history = &context[start..];

        let mut messages = Vec::with_capacity(2 + history.len() * 2);
        messages.push(ChatMessage::system(&self.system_prompt));
        for entry in history {
            messages.push(ChatMessage::user(&entry.user_input));
            messages.push(ChatMessage::assistant(&entry.response));
        }
        messages.push(ChatMessage::user(&plan.prompt));
        messages
    }

    /// Send the plan to the completion service and return the raw answer.
    pub async fn generate(
        &self,
        plan: &Plan,
        context: &[Interaction],
        llm: &LLMManager,
    ) -> Result<String> {
        let messages = self.build_messages(plan, context);
        info!(
            "Generating {} response with {} context messages",
            plan.task_type,
            messages.len().saturating_sub(2)
        );

        llm.complete(&CompletionRequest::new(messages))
            .await
            .with_context(|| format!("Failed to generate {} response", plan.task_type))
    }

    /// Wrap a response with the header for its task type.
    pub fn format_response(&self, response: &str, task_type: &str) -> String {
        format!(
            "\n{}\n{}\n{}\n",
            header_for(task_type),
            "=".repeat(HEADER_RULE_WIDTH),
            response
        )
    }

    fn default_system_prompt() -> String {
        r#"You are an AI Study Buddy, a helpful and encouraging educational assistant.
Your goal is to help students learn effectively by:
- Explaining concepts clearly and concisely
- Adapting to the student's level
- Providing examples and analogies
- Encouraging curiosity and deeper understanding
- Being patient and supportive

Always be accurate, helpful, and engaging."#
            .to_string()
    }
}

impl Default for OutputGenerator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn header_for(task_type: &str) -> &'static str {
    match task_type {
        "explanation" => "📚 Explanation",
        "summary" => "📝 Summary",
        "quiz" => "❓ Quiz Time",
        "definition" => "📖 Definition",
        "comparison" => "⚖️ Comparison",
        "practice" => "✏️ Practice",
        _ => FALLBACK_HEADER,
    }
}
