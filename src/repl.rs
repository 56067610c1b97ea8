use std::time::Duration;

use anyhow::Result;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::agent::StudyAgent;

/// A line typed at the study prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Quit,
    Difficulty(String),
    Reset,
    Summary,
    Query(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();

        if trimmed.is_empty() {
            Command::Empty
        } else if lower == "quit" {
            Command::Quit
        } else if let Some(level) = lower.strip_prefix("difficulty ") {
            Command::Difficulty(level.trim().to_string())
        } else if lower == "/reset" {
            Command::Reset
        } else if lower == "/summary" {
            Command::Summary
        } else {
            Command::Query(trimmed.to_string())
        }
    }
}

/// Line-oriented study loop over stdin.
pub struct Repl {
    agent: StudyAgent,
    spinner: bool,
}

impl Repl {
    pub fn new(agent: StudyAgent, spinner: bool) -> Self {
        Self { agent, spinner }
    }

    pub async fn run(&mut self) -> Result<()> {
        print_banner();

        let mut lines = BufReader::new(io::stdin()).lines();
        let mut stdout = io::stdout();

        loop {
            stdout
                .write_all(format!("\n{} ", "📝 You:".bright_white().bold()).as_bytes())
                .await?;
            stdout.flush().await?;

            let Some(line) = lines.next_line().await? else {
                println!("\n\n👋 Goodbye!");
                break;
            };

            if !self.dispatch(Command::parse(&line)).await {
                break;
            }
        }

        Ok(())
    }

    /// Act on one command. Returns false once the loop should stop.
    ///
    /// A failed turn is reported and leaves the loop running.
    async fn dispatch(&mut self, command: Command) -> bool {
        match command {
            Command::Empty => {}
            Command::Quit => {
                println!("\n{}", "📊 Session Summary:".bright_white().bold());
                println!("{}", self.agent.session_summary());
                println!("\n👋 Goodbye! Happy studying!");
                return false;
            }
            Command::Difficulty(level) => {
                println!("{}", self.agent.set_difficulty(&level).await);
            }
            Command::Reset => {
                self.agent.reset().await;
                println!("{}", "🔄 Session reset".green());
            }
            Command::Summary => {
                println!("{}", self.agent.session_summary());
            }
            Command::Query(query) => {
                if let Err(e) = self.handle_query(&query).await {
                    error!("Turn failed: {:#}", e);
                    println!("\n{} {:#}", "❌ Error:".red().bold(), e);
                }
            }
        }
        true
    }

    async fn handle_query(&mut self, query: &str) -> Result<()> {
        let spinner = self.spinner.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message("🤔 Thinking...");
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        let result = self.agent.process_query(query).await;

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        let outcome = result?;
        info!(
            "Answered {} query ({} chars)",
            outcome.trace.plan.task_type, outcome.trace.output.response_length
        );
        println!("{}", outcome.formatted);
        Ok(())
    }
}

fn print_banner() {
    println!("{}", "🎓 AI Study Buddy Agent".bright_white().bold());
    println!("{}", "=".repeat(40).bright_blue());
    println!("Commands: 'quit' to exit, 'difficulty <level>' to change level");
    println!("          '/summary' for session info, '/reset' to start over");
    println!("Difficulty levels: beginner, intermediate, advanced");
    println!("{}\n", "=".repeat(40).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::ScriptedProvider;
    use crate::config::PipelineConfig;
    use crate::llm_manager::LLMManager;
    use std::sync::Arc;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("quit"), Command::Quit);
        assert_eq!(Command::parse("QUIT "), Command::Quit);
        assert_eq!(
            Command::parse("difficulty Advanced"),
            Command::Difficulty("advanced".to_string())
        );
        assert_eq!(
            Command::parse("difficulty expert"),
            Command::Difficulty("expert".to_string())
        );
        assert_eq!(Command::parse("/reset"), Command::Reset);
        assert_eq!(Command::parse("/SUMMARY"), Command::Summary);
    }

    #[test]
    fn test_other_lines_are_queries() {
        assert_eq!(
            Command::parse("  What is photosynthesis? "),
            Command::Query("What is photosynthesis?".to_string())
        );
        // Bare keyword without a level is a study query
        assert_eq!(Command::parse("difficulty"), Command::Query("difficulty".to_string()));
        assert_eq!(
            Command::parse("summary of the cold war"),
            Command::Query("summary of the cold war".to_string())
        );
        assert_eq!(Command::parse("summary"), Command::Query("summary".to_string()));
        assert_eq!(Command::parse("reset"), Command::Query("reset".to_string()));
    }

    fn repl_with(replies: Vec<Result<&str, &str>>) -> Repl {
        let provider = ScriptedProvider::new(replies);
        let llm = Arc::new(LLMManager::new(Box::new(provider)));
        let config = PipelineConfig { analyze_input: false, ..PipelineConfig::default() };
        Repl::new(StudyAgent::new(llm, &config), false)
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_loop_running() {
        let mut repl = repl_with(vec![Err("service unavailable"), Ok("Recursion is...")]);

        assert!(repl.dispatch(Command::Query("Explain recursion".to_string())).await);
        assert!(repl.agent.session().interactions().is_empty());

        assert!(repl.dispatch(Command::Query("Explain recursion".to_string())).await);
        let interactions = repl.agent.session().interactions();
        assert_eq!(interactions.len(), 1);
        assert_eq!(interactions[0].response, "Recursion is...");
    }

    #[tokio::test]
    async fn test_quit_stops_and_summary_does_not() {
        let mut repl = repl_with(vec![]);
        assert!(repl.dispatch(Command::Summary).await);
        assert!(repl.dispatch(Command::Difficulty("advanced".to_string())).await);
        assert!(!repl.dispatch(Command::Quit).await);
    }
}
