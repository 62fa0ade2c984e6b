//! Closed vocabularies for synthesized tasks and the estimation formula revision.
//!
//! The lists below are the only place the allowed values live. Prompt templating renders
//! them into the field descriptions and validation checks model output against them, so a
//! vocabulary change bumps [`VOCABULARY_VERSION`] once for both consumers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version of the allowed-values contract embedded in prompts.
pub const VOCABULARY_VERSION: u32 = 2;

/// MSCW prioritization tier, ordered from most to least important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// `1 Must Have`
    MustHave,
    /// `2 Should Have`
    ShouldHave,
    /// `3 Could Have`
    CouldHave,
}

impl Priority {
    /// All tiers in their canonical order.
    pub const ALL: [Priority; 3] = [Self::MustHave, Self::ShouldHave, Self::CouldHave];

    /// Label stored in spreadsheets and the search index.
    pub const fn label(self) -> &'static str {
        match self {
            Self::MustHave => "1 Must Have",
            Self::ShouldHave => "2 Should Have",
            Self::CouldHave => "3 Could Have",
        }
    }

    /// Parse a tier label, accepting the numbered form, the bare form, and any casing.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || c.is_whitespace())
            .to_ascii_lowercase();
        match normalized.as_str() {
            "must have" | "must" => Some(Self::MustHave),
            "should have" | "should" => Some(Self::ShouldHave),
            "could have" | "could" => Some(Self::CouldHave),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Task fields constrained by a closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// `MSCW`
    Priority,
    /// `Area`
    Area,
    /// `Module`
    Module,
    /// `Feature`
    Feature,
    /// `Profile`; allowed values come from the rate table.
    Profile,
}

impl Field {
    /// Column name used in prompts, spreadsheets, and search documents.
    pub const fn column(self) -> &'static str {
        match self {
            Self::Priority => "MSCW",
            Self::Area => "Area",
            Self::Module => "Module",
            Self::Feature => "Feature",
            Self::Profile => "Profile",
        }
    }
}

/// Allowed values for the static task fields.
#[derive(Debug)]
pub struct Vocabulary {
    /// Contract version.
    pub version: u32,
    /// Project areas.
    pub areas: &'static [&'static str],
    /// Software engineering domains.
    pub modules: &'static [&'static str],
    /// Kinds of work.
    pub features: &'static [&'static str],
}

/// The vocabulary shared by prompt construction, validation, and fake data.
pub static VOCABULARY: Vocabulary = Vocabulary {
    version: VOCABULARY_VERSION,
    areas: &["01 Analyze & Design", "03 Setup", "04 Development"],
    modules: &[
        "Overall",
        "Frontend",
        "Middleware",
        "Infra",
        "IoT",
        "Security",
    ],
    features: &[
        "General",
        "Technical Lead",
        "Project Manager",
        "Sprint Artifacts & Meetings",
        "Technical Analysis",
        "Functional Analysis",
        "User Experience (UX)",
        "User Interface (UI)",
        "Security Review",
        "Go-Live support",
        "Setup Environment + Azure",
        "Setup Projects",
        "Authentication & Authorizations",
        "Monitoring",
        "Notifications",
        "Settings",
        "Filtering / search",
    ],
};

impl Vocabulary {
    /// Allowed values for a static field; `None` for fields resolved elsewhere.
    pub fn allowed(&self, field: Field) -> Option<Vec<&'static str>> {
        match field {
            Field::Priority => Some(Priority::ALL.iter().map(|tier| tier.label()).collect()),
            Field::Area => Some(self.areas.to_vec()),
            Field::Module => Some(self.modules.to_vec()),
            Field::Feature => Some(self.features.to_vec()),
            Field::Profile => None,
        }
    }

    /// Whether `value` is acceptable for `field`. Profiles always pass here.
    pub fn accepts(&self, field: Field, value: &str) -> bool {
        let value = value.trim();
        match field {
            Field::Priority => Priority::parse(value).is_some(),
            Field::Profile => true,
            other => self
                .allowed(other)
                .is_some_and(|values| values.iter().any(|allowed| *allowed == value)),
        }
    }

    /// Render the allowed values as a quoted, comma-separated list for prompts.
    pub fn quoted(&self, field: Field) -> String {
        self.allowed(field)
            .unwrap_or_default()
            .iter()
            .map(|value| format!("\"{value}\""))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Revision of the EstimatedDays rule and the response envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Revision {
    /// `ceil((MinDays + 4·RealDays + 4·MaxDays) / 9)`; envelope carries `total_price`.
    #[default]
    Weighted,
    /// Any value in `[MinDays, MaxDays]`, rounded down above RealDays and up otherwise;
    /// envelope carries `total_duration`.
    Bounded,
}

impl Revision {
    /// Summary field the model is asked to include next to `tasks`.
    pub const fn summary_field(self) -> &'static str {
        match self {
            Self::Weighted => "total_price",
            Self::Bounded => "total_duration",
        }
    }
}

impl std::str::FromStr for Revision {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weighted" | "a" => Ok(Self::Weighted),
            "bounded" | "b" => Ok(Self::Bounded),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parse_accepts_label_variants() {
        assert_eq!(Priority::parse("1 Must Have"), Some(Priority::MustHave));
        assert_eq!(Priority::parse("should have"), Some(Priority::ShouldHave));
        assert_eq!(Priority::parse(" 3 Could Have "), Some(Priority::CouldHave));
        assert_eq!(Priority::parse("Won't Have"), None);
    }

    #[test]
    fn priorities_are_ordered() {
        let mut tiers = vec![Priority::CouldHave, Priority::MustHave, Priority::ShouldHave];
        tiers.sort();
        assert_eq!(tiers, Priority::ALL.to_vec());
    }

    #[test]
    fn accepts_checks_static_fields_only() {
        assert!(VOCABULARY.accepts(Field::Area, "03 Setup"));
        assert!(!VOCABULARY.accepts(Field::Area, "02 Architecture"));
        assert!(VOCABULARY.accepts(Field::Feature, "Filtering / search"));
        assert!(VOCABULARY.accepts(Field::Profile, "anything at all"));
    }

    #[test]
    fn quoted_renders_prompt_list() {
        assert_eq!(
            VOCABULARY.quoted(Field::Priority),
            "\"1 Must Have\", \"2 Should Have\", \"3 Could Have\""
        );
    }

    #[test]
    fn revision_parses_and_names_summary_field() {
        assert_eq!("Bounded".parse::<Revision>(), Ok(Revision::Bounded));
        assert_eq!(Revision::default(), Revision::Weighted);
        assert_eq!(Revision::Weighted.summary_field(), "total_price");
        assert_eq!(Revision::Bounded.summary_field(), "total_duration");
        assert!("ceiling".parse::<Revision>().is_err());
    }
}
