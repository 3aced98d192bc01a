use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A weighted slice of a topic, as defined by the content catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtopic {
    pub id: String,
    pub parent_topic_id: String,
    pub title: String,
    /// Source text prompts are built from.
    pub content: String,
    pub weight: f64,
    #[serde(default)]
    pub order: i32,
    #[serde(flatten)]
    pub details: SubtopicDetails,
}

/// Kind-specific payload. The `kind` tag also steers prompt style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SubtopicDetails {
    Concept {
        #[serde(default)]
        key_terms: Vec<String>,
    },
    Object {
        #[serde(default)]
        protected_interest: Option<String>,
    },
    Consequence {
        #[serde(default)]
        sanctions: Vec<String>,
    },
    EquivalentConduct {
        #[serde(default)]
        equivalent_to: Option<String>,
    },
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleHint {
    Definition,
    Scenario,
    Consequence,
    Comparison,
    Direct,
}

impl StyleHint {
    pub fn instruction(self) -> &'static str {
        match self {
            StyleHint::Definition => "Phrase the statement as a claim about what the concept means or includes.",
            StyleHint::Scenario => "Phrase the statement as a short practical scenario and a claim about it.",
            StyleHint::Consequence => "Phrase the statement as a claim about the consequence or penalty that follows.",
            StyleHint::Comparison => "Phrase the statement as a claim comparing the conduct with an equivalent one.",
            StyleHint::Direct => "Phrase the statement as a direct factual claim taken from the content.",
        }
    }
}

impl SubtopicDetails {
    pub fn kind(&self) -> &'static str {
        match self {
            SubtopicDetails::Concept { .. } => "concept",
            SubtopicDetails::Object { .. } => "object",
            SubtopicDetails::Consequence { .. } => "consequence",
            SubtopicDetails::EquivalentConduct { .. } => "equivalent-conduct",
            SubtopicDetails::General => "general",
        }
    }

    pub fn style_hint(&self) -> StyleHint {
        match self {
            SubtopicDetails::Concept { .. } => StyleHint::Definition,
            SubtopicDetails::Object { .. } => StyleHint::Scenario,
            SubtopicDetails::Consequence { .. } => StyleHint::Consequence,
            SubtopicDetails::EquivalentConduct { .. } => StyleHint::Comparison,
            SubtopicDetails::General => StyleHint::Direct,
        }
    }
}

impl Subtopic {
    pub fn style_hint(&self) -> StyleHint {
        self.details.style_hint()
    }

    /// Boundary check applied whenever subtopics are loaded from a catalogue.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Configuration("Subtopic id must not be empty".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(Error::Configuration(format!("Subtopic {} has no title", self.id)));
        }
        if self.content.trim().is_empty() {
            return Err(Error::Configuration(format!("Subtopic {} has no content", self.id)));
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(Error::Configuration(format!(
                "Subtopic {} has invalid weight {}",
                self.id, self.weight
            )));
        }
        Ok(())
    }
}

/// Parse and validate a JSON catalogue (an array of subtopics).
pub fn parse_catalogue(raw: &str) -> Result<Vec<Subtopic>> {
    let subtopics: Vec<Subtopic> = serde_json::from_str(raw)
        .map_err(|e| Error::Configuration(format!("Invalid catalogue: {}", e)))?;
    for subtopic in &subtopics {
        subtopic.validate()?;
    }
    Ok(subtopics)
}
