use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

mod agent;
mod config;
mod event_bus;
mod generator;
mod interpreter;
mod llm_manager;
mod logger;
mod planner;
mod providers;
mod repl;
mod session;
mod ui_dashboard;

use agent::StudyAgent;
use config::Config;
use event_bus::{EventBus, EventEmitter};
use llm_manager::{LLMManager, LLMProvider, LocalProvider};
use providers::groq::GroqProvider;
use repl::Repl;
use ui_dashboard::DashboardUI;

#[derive(Parser)]
#[command(name = "study_buddy", about = "AI Study Buddy: explanations, summaries, quizzes and practice")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
    /// Full-screen dashboard showing every pipeline stage
    #[arg(short, long)]
    dashboard: bool,
    /// Answer locally without calling the completion service
    #[arg(long)]
    offline: bool,
    /// Starting difficulty (beginner, intermediate, advanced)
    #[arg(long)]
    difficulty: Option<String>,
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let event_bus = Arc::new(EventBus::new(1000));
    // Subscribed before config and provider setup so their warnings reach the dashboard
    let dashboard_events = if args.dashboard {
        logger::init_dashboard(event_bus.clone(), args.verbose).context("Failed to install logger")?;
        Some(event_bus.subscribe())
    } else {
        logger::init(args.verbose);
        None
    };

    let mut config = Config::load(&args.config)?;
    config.merge_with_args(args.no_color);
    if !config.ui.colorful {
        colored::control::set_override(false);
    }

    let provider: Box<dyn LLMProvider> = if args.offline {
        Box::new(LocalProvider)
    } else {
        Box::new(GroqProvider::from_config(&config.provider)?)
    };
    let llm_manager = Arc::new(LLMManager::new(provider).with_event_bus(event_bus.clone()));
    info!(
        "Using provider {} with model {}",
        llm_manager.provider_name(),
        llm_manager.model_name()
    );

    let mut agent = StudyAgent::new(llm_manager, &config.pipeline);
    agent.set_event_bus(event_bus.clone());
    if let Some(level) = &args.difficulty {
        if level.parse::<session::Difficulty>().is_ok() {
            agent.set_difficulty(level).await;
        } else {
            warn!("Ignoring unknown difficulty level: {}", level);
        }
    }

    if let Some(receiver) = dashboard_events {
        DashboardUI::new(agent, event_bus).run(receiver).await
    } else {
        Repl::new(agent, config.ui.colorful).run().await
    }
}
