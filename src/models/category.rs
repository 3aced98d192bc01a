use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Conceptual area a quiz item touches, derived from its wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Definition,
    Requirement,
    Exception,
    Sanction,
    Procedure,
    Deadline,
    Authority,
    Subject,
}

impl ContentCategory {
    pub const ALL: [ContentCategory; 8] = [
        ContentCategory::Definition,
        ContentCategory::Requirement,
        ContentCategory::Exception,
        ContentCategory::Sanction,
        ContentCategory::Procedure,
        ContentCategory::Deadline,
        ContentCategory::Authority,
        ContentCategory::Subject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentCategory::Definition => "definition",
            ContentCategory::Requirement => "requirement",
            ContentCategory::Exception => "exception",
            ContentCategory::Sanction => "sanction",
            ContentCategory::Procedure => "procedure",
            ContentCategory::Deadline => "deadline",
            ContentCategory::Authority => "authority",
            ContentCategory::Subject => "subject",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }

    /// Lower-case stems matched against normalized text.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            ContentCategory::Definition => &["defin", "means", "concept", "consists", "is considered"],
            ContentCategory::Requirement => &["require", "must", "condition", "necessary", "only if"],
            ContentCategory::Exception => &["except", "unless", "exempt", "excluded", "does not apply"],
            ContentCategory::Sanction => &["penalt", "sanction", "fine", "prison", "punish", "liable"],
            ContentCategory::Procedure => &["procedure", "process", "file", "appeal", "request", "notif"],
            ContentCategory::Deadline => &["deadline", "within", "days", "months", "years", "period"],
            ContentCategory::Authority => &["court", "judge", "authority", "minist", "tribunal", "agency"],
            ContentCategory::Subject => &["person", "party", "citizen", "owner", "offender", "victim"],
        }
    }

    /// How a gap in this area is phrased in generation guidance.
    pub fn exploration_hint(self) -> &'static str {
        match self {
            ContentCategory::Definition => "ask what the concept precisely covers",
            ContentCategory::Requirement => "test the conditions that must be met",
            ContentCategory::Exception => "probe the cases where the rule does not apply",
            ContentCategory::Sanction => "cover the consequences and penalties",
            ContentCategory::Procedure => "walk through the steps of the procedure",
            ContentCategory::Deadline => "check time limits and periods",
            ContentCategory::Authority => "ask which body or authority is competent",
            ContentCategory::Subject => "focus on who may act or be affected",
        }
    }
}
