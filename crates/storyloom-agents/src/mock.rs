//! Deterministic fallback payloads.
//!
//! When a downstream agent is unavailable or has exhausted its retries, the
//! adapters degrade to these builders. Everything here is a pure function of
//! its input: no clocks, no randomness, no I/O, so tests and degraded runs
//! are reproducible.

use serde_json::json;

use storyloom_types::{InputAnalysis, NarrativeContext, NarrativePiece, WorldDelta, WorldUpdates};

const MOVEMENT_WORDS: &[&str] = &["go", "walk", "move", "head", "enter", "leave", "climb"];
const OBSERVATION_WORDS: &[&str] = &["look", "examine", "inspect", "observe", "watch", "read"];
const DIALOGUE_WORDS: &[&str] = &["say", "talk", "ask", "tell", "speak", "greet"];
const EMOTION_WORDS: &[&str] = &[
    "feel", "feeling", "anxious", "afraid", "scared", "worried", "sad", "angry", "lonely",
    "overwhelmed",
];

/// Keyword-based intent classification used by the mock input analysis.
pub fn detect_intent(text: &str) -> (&'static str, f64) {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let contains_any = |set: &[&str]| words.iter().any(|w| set.contains(w));

    if contains_any(EMOTION_WORDS) {
        ("emotional_expression", 0.75)
    } else if contains_any(MOVEMENT_WORDS) {
        ("movement", 0.75)
    } else if contains_any(OBSERVATION_WORDS) {
        ("observation", 0.75)
    } else if contains_any(DIALOGUE_WORDS) {
        ("dialogue", 0.75)
    } else {
        ("narrative_action", 0.5)
    }
}

/// Capitalized tokens, deduplicated in order of first appearance.
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();
    for token in text.split(|c: char| !c.is_alphanumeric()) {
        let mut chars = token.chars();
        let Some(first) = chars.next() else { continue };
        if first.is_uppercase() && chars.next().is_some() {
            let token = token.to_string();
            if !entities.contains(&token) {
                entities.push(token);
            }
        }
    }
    entities
}

/// Mock replacement for the input-understanding collaborator.
pub fn mock_input_analysis(text: &str) -> InputAnalysis {
    let (intent, confidence) = detect_intent(text);
    InputAnalysis {
        intent: intent.to_string(),
        confidence,
        entities: extract_entities(text),
    }
}

/// Mock replacement for the world-mutation collaborator.
pub fn mock_world_delta(world_id: &str, updates: &WorldUpdates) -> WorldDelta {
    WorldDelta {
        world_state: json!({
            "world_id": world_id,
            "last_intent": updates.intent,
            "entities": updates.entities,
            "regions": [],
        }),
        updated: true,
        description: None,
    }
}

/// Mock replacement for the narrative-generation collaborator. The story is
/// keyed off the detected intent so degraded sessions still read coherently.
pub fn mock_story(context: &NarrativeContext) -> NarrativePiece {
    let story = match context.intent.as_str() {
        "emotional_expression" => {
            "You pause and let the feeling settle. The grove around you stays quiet and \
             unhurried, and nothing here asks more of you than you are ready to give."
        }
        "movement" => {
            "You set off, and the path answers your footsteps. The landscape shifts gently \
             around you, opening toward whatever comes next."
        }
        "observation" => {
            "You take your time looking. Small details come forward one by one, each of them \
             steady and unremarkable in a way that feels reassuring."
        }
        "dialogue" => {
            "Your words hang in the air for a moment before they are met. The conversation \
             unfolds slowly, with room for everything you meant to say."
        }
        _ => {
            "The story leans in to follow your lead. The world holds its shape around you, \
             patient, while your choice ripples outward."
        }
    };
    NarrativePiece {
        story: story.to_string(),
    }
}
