use std::sync::Arc;

use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::event_bus::{Event, EventBus, EventEmitter};
use crate::generator::OutputGenerator;
use crate::impl_event_emitter;
use crate::interpreter::{Intent, Interpreter};
use crate::llm_manager::LLMManager;
use crate::planner::{Plan, Planner};
use crate::session::{Difficulty, Session, SessionSummary};

/// What the input stage saw and decided.
#[derive(Debug, Clone, Serialize)]
pub struct InputTrace {
    pub raw_input: String,
    pub intent: Intent,
    pub analysis: Option<String>,
}

/// Session state after the turn was recorded.
#[derive(Debug, Clone, Serialize)]
pub struct StateTrace {
    pub current_topic: Option<String>,
    pub difficulty: Difficulty,
    pub topics_covered: Vec<String>,
    pub interaction_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputTrace {
    pub context_used: usize,
    pub response_length: usize,
}

/// Snapshot of every pipeline stage for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineTrace {
    pub input: InputTrace,
    pub state: StateTrace,
    pub plan: Plan,
    pub output: OutputTrace,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Response wrapped with its task header, ready to print.
    pub formatted: String,
    pub raw_response: String,
    pub trace: PipelineTrace,
}

/// Runs the classify → plan → render pipeline over one session.
pub struct StudyAgent {
    interpreter: Interpreter,
    planner: Planner,
    generator: OutputGenerator,
    session: Session,
    llm_manager: Arc<LLMManager>,
    analyze_input: bool,
    context_window: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl StudyAgent {
    pub fn new(llm_manager: Arc<LLMManager>, config: &PipelineConfig) -> Self {
        Self {
            interpreter: Interpreter::new(),
            planner: Planner::new(),
            generator: OutputGenerator::new().with_history_turns(config.history_turns),
            session: Session::new(),
            llm_manager,
            analyze_input: config.analyze_input,
            context_window: config.context_window,
            event_bus: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Process one study query end to end.
    ///
    /// Nothing is recorded in the session when a completion call fails.
    pub async fn process_query(&mut self, user_input: &str) -> Result<TurnOutcome> {
        let _ = self
            .emit_event(Event::QueryReceived { input: user_input.to_string() })
            .await;

        let intent = self.interpreter.classify(user_input);
        info!("Classified intent: {}", intent);
        let _ = self
            .emit_event(Event::IntentClassified { intent: intent.to_string() })
            .await;

        let analysis = if self.analyze_input {
            let parsed = self.interpreter.analyze(user_input, &self.llm_manager).await?;
            Some(parsed.analysis)
        } else {
            None
        };

        self.session.set_topic(user_input);

        let plan = self.planner.plan(intent, user_input, self.session.difficulty());
        info!("Plan: {} ({} steps)", plan.task_type, plan.steps.len());
        let _ = self
            .emit_event(Event::PlanCreated {
                task_type: plan.task_type.to_string(),
                steps: plan.steps.len(),
            })
            .await;

        let context = self.session.recent(self.context_window);
        let context_used = context.len();
        let response = self
            .generator
            .generate(&plan, context, &self.llm_manager)
            .await?;
        let formatted = self
            .generator
            .format_response(&response, plan.task_type.as_str());

        self.session
            .record_interaction(user_input, intent, analysis.clone(), &response);

        let _ = self
            .emit_event(Event::ResponseGenerated {
                task_type: plan.task_type.to_string(),
                length: response.len(),
            })
            .await;

        let trace = PipelineTrace {
            input: InputTrace {
                raw_input: user_input.to_string(),
                intent,
                analysis,
            },
            state: StateTrace {
                current_topic: self.session.current_topic().map(str::to_string),
                difficulty: self.session.difficulty(),
                topics_covered: self.session.topics_covered().to_vec(),
                interaction_count: self.session.interactions().len(),
            },
            output: OutputTrace {
                context_used,
                response_length: response.len(),
            },
            plan,
        };

        Ok(TurnOutcome {
            formatted,
            raw_response: response,
            trace,
        })
    }

    /// Set the difficulty from user text and return the confirmation line.
    ///
    /// Unknown levels are ignored without any error; the confirmation echoes them anyway.
    pub async fn set_difficulty(&mut self, level: &str) -> String {
        if self.session.set_difficulty_str(level) {
            let _ = self
                .emit_event(Event::DifficultyChanged {
                    level: self.session.difficulty().to_string(),
                })
                .await;
        }
        format!("Difficulty set to: {}", level)
    }

    pub fn session_summary(&self) -> SessionSummary {
        self.session.summary()
    }

    pub async fn reset(&mut self) {
        self.session.reset();
        info!("Session reset: {}", self.session.id);
        let _ = self
            .emit_event(Event::SessionReset {
                session_id: self.session.id.clone(),
            })
            .await;
    }
}

impl_event_emitter!(StudyAgent);

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm_manager::{Completion, CompletionRequest, LLMProvider};
    use crate::planner::TaskType;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a script and remembers every request it was sent.
    pub(crate) struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub(crate) requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("default answer".to_string()));
            match reply {
                Ok(content) => Ok(Completion { content, total_tokens: Some(42) }),
                Err(message) => Err(anyhow!(message)),
            }
        }
    }

    fn pipeline(analyze_input: bool) -> PipelineConfig {
        PipelineConfig {
            analyze_input,
            ..PipelineConfig::default()
        }
    }

    fn agent_with(
        replies: Vec<Result<&str, &str>>,
        analyze_input: bool,
    ) -> (StudyAgent, Arc<Mutex<Vec<CompletionRequest>>>) {
        let provider = ScriptedProvider::new(replies);
        let requests = provider.requests.clone();
        let llm = Arc::new(LLMManager::new(Box::new(provider)));
        (StudyAgent::new(llm, &pipeline(analyze_input)), requests)
    }

    #[tokio::test]
    async fn test_definition_scenario() {
        let (mut agent, requests) = agent_with(vec![Ok("Photosynthesis converts light...")], false);

        let outcome = agent.process_query("What is photosynthesis?").await.unwrap();

        assert_eq!(outcome.trace.input.intent, Intent::Define);
        assert_eq!(outcome.trace.plan.task_type, TaskType::Definition);
        assert!(outcome.trace.plan.prompt.contains("What is photosynthesis?"));
        assert!(outcome.trace.plan.prompt.contains("intermediate"));
        assert_eq!(outcome.raw_response, "Photosynthesis converts light...");
        assert!(outcome.formatted.starts_with("\n📖 Definition\n"));
        assert!(outcome.formatted.contains("Photosynthesis converts light..."));

        let sent = requests.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].messages.last().unwrap().content, outcome.trace.plan.prompt);
    }

    #[tokio::test]
    async fn test_quiz_scenario() {
        let (mut agent, _) = agent_with(vec![Ok("Q1 ...")], false);
        let outcome = agent.process_query("quiz").await.unwrap();
        assert_eq!(outcome.trace.input.intent, Intent::Quiz);
        assert_eq!(outcome.trace.plan.task_type, TaskType::Quiz);
        assert!(outcome.formatted.starts_with("\n❓ Quiz Time\n"));
    }

    #[tokio::test]
    async fn test_turn_updates_session_and_trace() {
        let (mut agent, _) = agent_with(vec![Ok("a1"), Ok("a2")], false);

        agent.process_query("Explain recursion").await.unwrap();
        let outcome = agent.process_query("Summarize sorting").await.unwrap();

        let state = &outcome.trace.state;
        assert_eq!(state.interaction_count, 2);
        assert_eq!(state.current_topic.as_deref(), Some("Summarize sorting"));
        assert_eq!(
            state.topics_covered,
            vec!["Explain recursion".to_string(), "Summarize sorting".to_string()]
        );
        assert_eq!(outcome.trace.output.context_used, 1);
        assert_eq!(outcome.trace.output.response_length, 2);

        let interactions = agent.session().interactions();
        assert_eq!(interactions[0].intent, Intent::Explain);
        assert_eq!(interactions[1].response, "a2");
    }

    #[tokio::test]
    async fn test_analysis_is_requested_and_stored() {
        let (mut agent, requests) =
            agent_with(vec![Ok(r#"{"intent": "define"}"#), Ok("Entropy is...")], true);

        let outcome = agent.process_query("Define entropy").await.unwrap();
        assert_eq!(outcome.trace.input.analysis.as_deref(), Some(r#"{"intent": "define"}"#));
        assert_eq!(outcome.raw_response, "Entropy is...");

        let sent = requests.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].max_tokens, Some(500));
        assert_eq!(sent[0].temperature, Some(0.3));
        assert!(sent[0].messages[0].content.contains("User query: Define entropy"));
        assert_eq!(sent[1].max_tokens, None);

        let recorded = &agent.session().interactions()[0];
        assert_eq!(recorded.analysis.as_deref(), Some(r#"{"intent": "define"}"#));
    }

    #[tokio::test]
    async fn test_failed_completion_records_nothing() {
        let (mut agent, _) = agent_with(vec![Err("rate limited"), Ok("fine now")], false);

        let err = agent.process_query("Explain DNS").await.unwrap_err();
        assert!(format!("{:#}", err).contains("rate limited"));
        assert!(agent.session().interactions().is_empty());
        assert!(agent.session().topics_covered().is_empty());

        let outcome = agent.process_query("Explain DNS").await.unwrap();
        assert_eq!(outcome.raw_response, "fine now");
        assert_eq!(agent.session().interactions().len(), 1);
    }

    #[tokio::test]
    async fn test_history_window_is_sent_with_prompt() {
        let (mut agent, requests) = agent_with(vec![], false);
        for i in 0..5 {
            agent.process_query(&format!("question {}", i)).await.unwrap();
        }

        let sent = requests.lock().unwrap();
        let last = sent.last().unwrap();
        // system + 3 replayed turns + prompt
        assert_eq!(last.messages.len(), 8);
        assert_eq!(last.messages[1].content, "question 1");
    }

    #[tokio::test]
    async fn test_difficulty_changes_prompt() {
        let (mut agent, _) = agent_with(vec![], false);

        assert_eq!(agent.set_difficulty("expert").await, "Difficulty set to: expert");
        assert_eq!(agent.session().difficulty(), Difficulty::Intermediate);

        assert_eq!(agent.set_difficulty("beginner").await, "Difficulty set to: beginner");
        let outcome = agent.process_query("Explain TCP").await.unwrap();
        assert!(outcome.trace.plan.prompt.contains("at a beginner level"));
    }

    #[tokio::test]
    async fn test_reset_and_events() {
        let (mut agent, _) = agent_with(vec![], false);
        let bus = Arc::new(EventBus::new(64));
        let mut receiver = bus.subscribe();
        agent.set_event_bus(bus.clone());

        agent.process_query("Compare lists and tuples").await.unwrap();
        agent.reset().await;

        assert_eq!(agent.session_summary().total_interactions, 0);
        assert!(agent.session().current_topic().is_none());

        let mut kinds = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            kinds.push(match event {
                Event::QueryReceived { .. } => "query",
                Event::IntentClassified { .. } => "intent",
                Event::PlanCreated { .. } => "plan",
                Event::ResponseGenerated { .. } => "response",
                Event::SessionReset { .. } => "reset",
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["query", "intent", "plan", "response", "reset"]);
        assert_eq!(bus.get_metrics().await.turns_completed, 1);
    }
}
