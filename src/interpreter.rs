use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::llm_manager::{ChatMessage, CompletionRequest, LLMManager};

const ANALYSIS_HEADER: &str = "Analyze the following study-related query and extract:";
const ANALYSIS_QUERY_PREFIX: &str = "User query: ";
const ANALYSIS_MAX_TOKENS: u32 = 500;
const ANALYSIS_TEMPERATURE: f32 = 0.3;

/// Coarse category of a study query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Explain,
    Summarize,
    Quiz,
    Define,
    Compare,
    Practice,
    General,
}

/// Keyword sets in priority order; the first label with a matching keyword wins.
const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (Intent::Explain, &["explain", "how"]),
    (Intent::Summarize, &["summarize", "summary"]),
    (Intent::Quiz, &["quiz", "test"]),
    (Intent::Define, &["define", "what is"]),
    (Intent::Compare, &["compare", "difference"]),
    (Intent::Practice, &["practice", "exercise"]),
];

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::Explain,
        Intent::Summarize,
        Intent::Quiz,
        Intent::Define,
        Intent::Compare,
        Intent::Practice,
        Intent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Explain => "explain",
            Intent::Summarize => "summarize",
            Intent::Quiz => "quiz",
            Intent::Define => "define",
            Intent::Compare => "compare",
            Intent::Practice => "practice",
            Intent::General => "general",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("Unknown intent: {}", s))
    }
}

/// Raw query plus the model's free-form analysis of it.
///
/// The analysis is kept as opaque text and is never parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedInput {
    pub raw_input: String,
    pub analysis: String,
}

/// Interprets raw input: keyword intent classification and optional model analysis.
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }

    /// Classify the primary intent of the user. Total over all strings.
    pub fn classify(&self, input: &str) -> Intent {
        let input_lower = input.to_lowercase();
        INTENT_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| input_lower.contains(k)))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::General)
    }

    /// Ask the model to extract intent, topic, difficulty and specifics as JSON.
    pub async fn analyze(&self, input: &str, llm: &LLMManager) -> Result<ParsedInput> {
        let request = CompletionRequest::new(vec![ChatMessage::user(analysis_prompt(input))])
            .with_max_tokens(ANALYSIS_MAX_TOKENS)
            .with_temperature(ANALYSIS_TEMPERATURE);

        let analysis = llm
            .complete(&request)
            .await
            .context("Failed to get input analysis from LLM")?;

        Ok(ParsedInput {
            raw_input: input.to_string(),
            analysis,
        })
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn analysis_prompt(input: &str) -> String {
    format!(
        "{ANALYSIS_HEADER}
1. intent (e.g., explain, summarize, quiz, define, compare)
2. topic (the main subject)
3. difficulty_level (beginner, intermediate, advanced)
4. specific_request (any specific details requested)

{ANALYSIS_QUERY_PREFIX}{input}

Respond in JSON format only."
    )
}

/// Recover the user query from a prompt built by [`analysis_prompt`].
fn analysis_query(prompt: &str) -> Option<&str> {
    if !prompt.starts_with(ANALYSIS_HEADER) {
        return None;
    }
    let start = prompt.find(ANALYSIS_QUERY_PREFIX)? + ANALYSIS_QUERY_PREFIX.len();
    let end = prompt.rfind("\n\nRespond in JSON format only.")?;
    prompt.get(start..end)
}

/// Local stand-in for the model's analysis, keyword-classified.
///
/// Returns `None` unless `prompt` came from [`analysis_prompt`].
pub fn offline_analysis(prompt: &str) -> Option<String> {
    let query = analysis_query(prompt)?;
    let intent = Interpreter::new().classify(query);
    Some(
        serde_json::json!({
            "intent": intent.as_str(),
            "topic": query,
            "difficulty_level": null,
            "specific_request": null,
        })
        .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_manager::LocalProvider;

    #[test]
    fn test_each_keyword_maps_to_its_intent() {
        let interpreter = Interpreter::new();
        let cases = [
            ("Please explain entropy", Intent::Explain),
            ("How do vaccines work", Intent::Explain),
            ("Summarize the French revolution", Intent::Summarize),
            ("Give me a summary of chapter 3", Intent::Summarize),
            ("quiz", Intent::Quiz),
            ("Test my knowledge of algebra", Intent::Quiz),
            ("Define osmosis", Intent::Define),
            ("What is photosynthesis?", Intent::Define),
            ("Compare TCP and UDP", Intent::Compare),
            ("the difference between mitosis and meiosis", Intent::Compare),
            ("practice problems on derivatives", Intent::Practice),
            ("an exercise on vectors", Intent::Practice),
            ("Tell me about Rome", Intent::General),
            ("", Intent::General),
        ];

        for (input, expected) in cases {
            assert_eq!(interpreter.classify(input), expected, "input: {:?}", input);
        }
    }

    #[test]
    fn test_classification_is_case_insensitive() {
        let interpreter = Interpreter::new();
        assert_eq!(interpreter.classify("QUIZ ME"), Intent::Quiz);
        assert_eq!(interpreter.classify("WhAt Is a monad"), Intent::Define);
    }

    #[test]
    fn test_priority_order_on_conflicting_inputs() {
        let interpreter = Interpreter::new();
        // explain > summarize
        assert_eq!(interpreter.classify("explain and summarize"), Intent::Explain);
        // summarize > quiz
        assert_eq!(interpreter.classify("summary then a quiz"), Intent::Summarize);
        // quiz > define
        assert_eq!(interpreter.classify("quiz me: what is a prime"), Intent::Quiz);
        // define > compare
        assert_eq!(interpreter.classify("define and compare"), Intent::Define);
        // compare > practice
        assert_eq!(interpreter.classify("compare practice sets"), Intent::Compare);
        // substring matching: "show" contains "how"
        assert_eq!(interpreter.classify("show me a quiz"), Intent::Explain);
    }

    #[test]
    fn test_intent_labels_round_trip() {
        for intent in Intent::ALL {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
            assert_eq!(intent.to_string(), intent.as_str());
        }
        assert!("lecture".parse::<Intent>().is_err());
    }

    #[test]
    fn test_analysis_query_extraction() {
        let prompt = analysis_prompt("What is a B-tree?");
        assert_eq!(analysis_query(&prompt), Some("What is a B-tree?"));
        assert_eq!(analysis_query("Explain B-trees"), None);
    }

    #[test]
    fn test_offline_analysis_only_answers_analysis_prompts() {
        let json: serde_json::Value =
            serde_json::from_str(&offline_analysis(&analysis_prompt("Compare heaps and stacks")).unwrap()).unwrap();
        assert_eq!(json["intent"], "compare");
        assert_eq!(json["topic"], "Compare heaps and stacks");
        assert!(json["difficulty_level"].is_null());

        assert_eq!(offline_analysis("Compare heaps and stacks"), None);
    }

    #[tokio::test]
    async fn test_analyze_returns_opaque_text() {
        let llm = LLMManager::new(Box::new(LocalProvider));
        let parsed = Interpreter::new().analyze("Define recursion", &llm).await.unwrap();

        assert_eq!(parsed.raw_input, "Define recursion");
        assert!(parsed.analysis.contains("\"intent\":\"define\""));
    }
}
