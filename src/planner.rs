use std::fmt;

use serde::{Deserialize, Serialize};

use crate::interpreter::Intent;
use crate::session::Difficulty;

/// Kind of answer a plan asks the model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Explanation,
    Summary,
    Quiz,
    Definition,
    Comparison,
    Practice,
    General,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Explanation => "explanation",
            TaskType::Summary => "summary",
            TaskType::Quiz => "quiz",
            TaskType::Definition => "definition",
            TaskType::Comparison => "comparison",
            TaskType::Practice => "practice",
            TaskType::General => "general",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task descriptor for one turn. Built fresh every time and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub task_type: TaskType,
    /// Display-only; the model only sees `prompt`.
    pub steps: Vec<String>,
    pub prompt: String,
}

type PlanBuilder = fn(&str, Difficulty) -> Plan;

/// Dispatch table from intent to its plan builder.
const PLAN_BUILDERS: &[(Intent, PlanBuilder)] = &[
    (Intent::Explain, plan_explanation as PlanBuilder),
    (Intent::Summarize, plan_summary as PlanBuilder),
    (Intent::Quiz, plan_quiz as PlanBuilder),
    (Intent::Define, plan_definition as PlanBuilder),
    (Intent::Compare, plan_comparison as PlanBuilder),
    (Intent::Practice, plan_practice as PlanBuilder),
    (Intent::General, plan_general as PlanBuilder),
];

pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Build the plan for an intent, topic and difficulty. Pure.
    pub fn plan(&self, intent: Intent, topic: &str, difficulty: Difficulty) -> Plan {
        let builder = PLAN_BUILDERS
            .iter()
            .find(|(key, _)| *key == intent)
            .map(|(_, builder)| *builder)
            .unwrap_or(plan_general);
        builder(topic, difficulty)
    }

    /// Same as [`Planner::plan`] for a textual intent label; unknown labels get the general plan.
    #[allow(dead_code)]
    pub fn plan_for_label(&self, label: &str, topic: &str, difficulty: Difficulty) -> Plan {
        match label.parse::<Intent>() {
            Ok(intent) => self.plan(intent, topic, difficulty),
            Err(_) => plan_general(topic, difficulty),
        }
    }
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

fn steps(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn plan_explanation(topic: &str, difficulty: Difficulty) -> Plan {
    Plan {
        task_type: TaskType::Explanation,
        steps: steps(&[
            "Provide a clear definition",
            "Explain core concepts",
            "Give real-world examples",
            "Summarize key points",
        ]),
        prompt: format!(
            "Explain {topic} at a {difficulty} level. Include definition, core concepts, examples, and key takeaways."
        ),
    }
}

fn plan_summary(topic: &str, difficulty: Difficulty) -> Plan {
    Plan {
        task_type: TaskType::Summary,
        steps: steps(&["Identify main points", "Condense information", "Highlight key takeaways"]),
        prompt: format!("Provide a concise summary of {topic} suitable for a {difficulty} learner."),
    }
}

fn plan_quiz(topic: &str, difficulty: Difficulty) -> Plan {
    Plan {
        task_type: TaskType::Quiz,
        steps: steps(&[
            "Generate questions",
            "Provide multiple choice options",
            "Include correct answers",
        ]),
        prompt: format!("Create a {difficulty} level quiz about {topic} with 5 questions. Include answers."),
    }
}

fn plan_definition(topic: &str, difficulty: Difficulty) -> Plan {
    Plan {
        task_type: TaskType::Definition,
        steps: steps(&["Provide clear definition", "Add brief context"]),
        prompt: format!("Define {topic} clearly for a {difficulty} level student."),
    }
}

fn plan_comparison(topic: &str, difficulty: Difficulty) -> Plan {
    Plan {
        task_type: TaskType::Comparison,
        steps: steps(&[
            "Identify items to compare",
            "List similarities",
            "List differences",
            "Provide conclusion",
        ]),
        prompt: format!("Compare and contrast the concepts in: {topic}. Suitable for {difficulty} level."),
    }
}

fn plan_practice(topic: &str, difficulty: Difficulty) -> Plan {
    Plan {
        task_type: TaskType::Practice,
        steps: steps(&["Generate practice problems", "Provide step-by-step solutions"]),
        prompt: format!("Create {difficulty} level practice exercises for {topic} with solutions."),
    }
}

fn plan_general(topic: &str, difficulty: Difficulty) -> Plan {
    Plan {
        task_type: TaskType::General,
        steps: steps(&["Respond to query"]),
        prompt: format!("Help the student with: {topic}. Respond at a {difficulty} level."),
    }
}
