//! # Writing Coach Demo
//!
//! Assembles the three role agents of a small writing game and drives one
//! round from the command line:
//!
//! - a badge generator (structured output) invents three hidden criteria,
//! - an evaluator (structured output, keeps history) judges the submission,
//! - a hint generator (plain text) nudges the writer toward unearned badges.
//!
//! # Usage
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run --example writing_coach -- poem "The kettle sang..."
//! RUST_LOG=agentrelay=debug OPENAI_API_KEY=sk-... cargo run --example writing_coach -- story "Once..."
//! ```

use agentrelay::{require_keys, Agent, ModelRegistry, Settings};
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

struct WritingType {
    id:          &'static str,
    prompt:      &'static str,
    description: &'static str,
}

static WRITING_TYPES: [WritingType; 3] = [
    WritingType { id: "poem",        prompt: "write a poem.",     description: "Use imagery and word choice to express yourself through poetry." },
    WritingType { id: "story",       prompt: "tell a story.",     description: "Create a short narrative, fiction or non-fiction." },
    WritingType { id: "description", prompt: "describe a scene.", description: "Use detailed observation to bring a moment or place to life." },
];

const BADGE_KEYS: [&str; 3] = ["badge_1", "badge_2", "badge_3"];

const BADGER_PROMPT: &str = "
You invent three hidden badges for a short writing exercise.
Answer with JSON only, shaped as
{\"badge_1\": {\"word\": ..., \"emoji\": ..., \"criteria\": ..., \"clue\": ...}, \"badge_2\": {...}, \"badge_3\": {...}}.
";

const EVALUATOR_PROMPT: &str = "
You judge whether a submission earns each of three badges. Be generous but reasonable.
Answer with JSON only, shaped as
{\"badge_1\": {\"reasoning\": ..., \"earned\": true|false}, \"badge_2\": {...}, \"badge_3\": {...}}.
";

const HINTER_PROMPT: &str = "
You give one short, encouraging hint that moves a writer toward the badges they have not earned yet.
Never reveal the criteria outright.
";

#[derive(Debug, Deserialize)]
struct Badge {
    word:     String,
    emoji:    String,
    criteria: String,
    clue:     String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let type_id = args.next().unwrap_or_else(|| "poem".to_string());
    let submission = args.collect::<Vec<_>>().join(" ");
    anyhow::ensure!(!submission.is_empty(), "usage: writing_coach <poem|story|description> <submission...>");

    let writing_type = WRITING_TYPES.iter()
        .find(|t| t.id == type_id)
        .unwrap_or(&WRITING_TYPES[0]);

    // One agent per role, built once and passed around by reference.
    let registry = ModelRegistry::builtin();
    let settings = Settings::from_env()?;
    let badger = Agent::builder("gpt", BADGER_PROMPT)
        .structured_output(true)
        .settings(settings.clone())
        .build(&registry)?;
    let evaluator = Agent::builder("gpt", EVALUATOR_PROMPT)
        .history(true)
        .structured_output(true)
        .settings(settings.clone())
        .build(&registry)?;
    let hinter = Agent::builder("4o", HINTER_PROMPT)
        .settings(settings)
        .build(&registry)?;

    // ── Badges ────────────────────────────────────────────────────────────
    let payload: Value = badger
        .respond_json(&format!(
            "Generate badges for this writing task: {} ({})",
            writing_type.prompt, writing_type.description
        ))
        .await
        .context("badge generation failed")?;
    require_keys(&payload, &BADGE_KEYS)?;

    let mut badges = Vec::new();
    for key in BADGE_KEYS {
        let badge: Badge = serde_json::from_value(payload[key].clone())
            .with_context(|| format!("{key} is malformed"))?;
        badges.push(badge);
    }

    println!("Task: {}\n", writing_type.prompt);
    for badge in &badges {
        println!("  {} {:<12} clue: {}", badge.emoji, badge.word, badge.clue);
    }

    // ── Evaluation ────────────────────────────────────────────────────────
    let criteria = badges.iter()
        .enumerate()
        .map(|(i, b)| format!("Badge {} ({}): {}", i + 1, b.word, b.criteria))
        .collect::<Vec<_>>()
        .join("\n");

    let verdict: Value = evaluator
        .respond_json(&format!(
            "Writing Task: {} ({})\n\nSubmission:\n{}\n\nEvaluate if this submission earns these badges:\n{}",
            writing_type.prompt, writing_type.description, submission, criteria
        ))
        .await
        .context("evaluation failed")?;
    require_keys(&verdict, &BADGE_KEYS)?;

    let mut unearned = Vec::new();
    println!();
    for (key, badge) in BADGE_KEYS.iter().zip(&badges) {
        let earned = match &verdict[*key]["earned"] {
            Value::Bool(b)   => *b,
            Value::String(s) => s.eq_ignore_ascii_case("true"),
            Value::Number(n) => n.as_i64() == Some(1),
            _                => false,
        };
        println!("  {} {:<12} {}", badge.emoji, badge.word, if earned { "earned" } else { "not yet" });
        if !earned {
            unearned.push(badge.word.as_str());
        }
    }

    // ── Hint ──────────────────────────────────────────────────────────────
    if !unearned.is_empty() {
        let hint = hinter
            .respond_text(&format!(
                "Writing Task: {} ({})\n\nCurrent submission: {}\nUnearned badges: {}",
                writing_type.prompt, writing_type.description, submission, unearned.join(", ")
            ))
            .await
            .context("hint generation failed")?;
        println!("\nHint: {hint}");
    }

    println!(
        "\nTokens used: badges={} evaluation={} hint={}",
        badger.usage().total_tokens,
        evaluator.usage().total_tokens,
        hinter.usage().total_tokens,
    );

    Ok(())
}
