use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interpreter::Intent;

/// Interactions handed to the renderer when no window is configured.
pub const DEFAULT_CONTEXT_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Beginner, Difficulty::Intermediate, Difficulty::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Difficulty::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| anyhow!("Unknown difficulty level: {}", s))
    }
}

/// One completed turn. Never modified after it is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub intent: Intent,
    pub analysis: Option<String>,
    pub response: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    #[serde(serialize_with = "serialize_duration")]
    pub session_duration: chrono::Duration,
    pub topics_covered: Vec<String>,
    pub total_interactions: usize,
    pub current_topic: Option<String>,
    pub difficulty_level: Difficulty,
}

fn serialize_duration<S: serde::Serializer>(d: &chrono::Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_duration(*d))
}

/// `H:MM:SS`, negative spans clamp to zero.
pub fn format_duration(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Duration:       {}", format_duration(self.session_duration))?;
        writeln!(f, "Interactions:   {}", self.total_interactions)?;
        writeln!(f, "Difficulty:     {}", self.difficulty_level)?;
        writeln!(
            f,
            "Current topic:  {}",
            self.current_topic.as_deref().unwrap_or("(none)")
        )?;
        write!(f, "Topics covered: {}", self.topics_covered.len())?;
        for topic in &self.topics_covered {
            write!(f, "\n  - {}", topic)?;
        }
        Ok(())
    }
}

/// Per-conversation state: interaction log plus the learner's preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    interactions: Vec<Interaction>,
    current_topic: Option<String>,
    difficulty: Difficulty,
    topics_covered: Vec<String>,
    started_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            interactions: Vec::new(),
            current_topic: None,
            difficulty: Difficulty::default(),
            topics_covered: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn current_topic(&self) -> Option<&str> {
        self.current_topic.as_deref()
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn topics_covered(&self) -> &[String] {
        &self.topics_covered
    }

    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Overwrite the current topic. Blank topics are ignored.
    pub fn set_topic(&mut self, topic: &str) {
        if topic.trim().is_empty() {
            return;
        }
        self.current_topic = Some(topic.to_string());
    }

    pub fn set_difficulty(&mut self, level: Difficulty) {
        self.difficulty = level;
    }

    /// Set the difficulty from user text. Only the exact lowercase level names
    /// are accepted; anything else leaves the state unchanged.
    pub fn set_difficulty_str(&mut self, level: &str) -> bool {
        match level.parse::<Difficulty>() {
            Ok(level) => {
                self.set_difficulty(level);
                true
            }
            Err(_) => false,
        }
    }

    /// Append a completed turn and mark the current topic as covered.
    pub fn record_interaction(
        &mut self,
        user_input: &str,
        intent: Intent,
        analysis: Option<String>,
        response: &str,
    ) {
        self.interactions.push(Interaction {
            timestamp: Utc::now(),
            user_input: user_input.to_string(),
            intent,
            analysis,
            response: response.to_string(),
        });

        if let Some(topic) = &self.current_topic {
            if !self.topics_covered.contains(topic) {
                self.topics_covered.push(topic.clone());
            }
        }
    }

    /// The last `n` interactions, oldest first.
    pub fn recent(&self, n: usize) -> &[Interaction] {
        let start = self.interactions.len().saturating_sub(n);
        &self.interactions[start..]
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_duration: Utc::now() - self.started_at,
            topics_covered: self.topics_covered.clone(),
            total_interactions: self.interactions.len(),
            current_topic: self.current_topic.clone(),
            difficulty_level: self.difficulty,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
