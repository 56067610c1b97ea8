use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

/// Events emitted by the pipeline and the LLM layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    LogLine {
        level: String,
        message: String,
    },

    // Pipeline events
    QueryReceived {
        input: String,
    },
    IntentClassified {
        intent: String,
    },
    PlanCreated {
        task_type: String,
        steps: usize,
    },
    ResponseGenerated {
        task_type: String,
        length: usize,
    },

    // API events
    APICallStarted {
        provider: String,
        model: String,
    },
    APICallCompleted {
        provider: String,
        tokens: usize,
    },
    APIError {
        provider: String,
        error: String,
    },

    // Session events
    DifficultyChanged {
        level: String,
    },
    SessionReset {
        session_id: String,
    },
}

/// Event bus for component communication
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    metrics: Arc<RwLock<Metrics>>,
}

/// Accumulated metrics from events
#[derive(Debug, Default, Clone)]
pub struct Metrics {
    pub total_api_calls: usize,
    pub total_tokens: usize,
    pub api_errors: usize,
    pub turns_completed: usize,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            metrics: Arc::new(RwLock::new(Metrics::default())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers
    pub async fn emit(&self, event: Event) -> Result<()> {
        self.update_metrics(&event).await;

        // Having no receivers is fine
        let _ = self.sender.send(event);
        Ok(())
    }

    /// Emit without touching metrics; usable from sync contexts such as the logger
    pub fn emit_nowait(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.read().await.clone()
    }

    async fn update_metrics(&self, event: &Event) {
        let mut metrics = self.metrics.write().await;

        match event {
            Event::APICallCompleted { tokens, .. } => {
                metrics.total_api_calls += 1;
                metrics.total_tokens += tokens;
            }
            Event::APIError { .. } => {
                metrics.total_api_calls += 1;
                metrics.api_errors += 1;
            }
            Event::ResponseGenerated { .. } => {
                metrics.turns_completed += 1;
            }
            _ => {}
        }
    }
}

/// Trait for components that can emit events
#[async_trait::async_trait]
pub trait EventEmitter {
    fn set_event_bus(&mut self, bus: Arc<EventBus>);

    async fn emit_event(&self, event: Event) -> Result<()>;
}

/// Helper macro to implement EventEmitter trait
#[macro_export]
macro_rules! impl_event_emitter {
    ($type:ty) => {
        #[async_trait::async_trait]
        impl EventEmitter for $type {
            fn set_event_bus(&mut self, bus: Arc<EventBus>) {
                self.event_bus = Some(bus);
            }

            async fn emit_event(&self, event: Event) -> anyhow::Result<()> {
                if let Some(bus) = &self.event_bus {
                    bus.emit(event).await
                } else {
                    Ok(())
                }
            }
        }
    };
}
