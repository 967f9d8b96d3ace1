use std::fmt;

use super::errors::WorkflowError;
use super::types::MarshallWorkflowLocation;

/// Requested change of a transient's observation priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityChange {
    Set(i64),
    /// Explicit null sentinel
    Clear,
}

impl PriorityChange {
    /// Parse the raw form submitted by the marshall web client: an integer,
    /// or `False`/`null`/blank to clear
    pub fn parse(raw: &str) -> Result<Self, WorkflowError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("false") || raw.eq_ignore_ascii_case("null") {
            return Ok(PriorityChange::Clear);
        }
        raw.parse::<i64>()
            .map(PriorityChange::Set)
            .map_err(|_| WorkflowError::validation(format!("observationPriority `{raw}` is not an integer")))
    }

    pub fn value(self) -> Option<i64> {
        match self {
            PriorityChange::Set(value) => Some(value),
            PriorityChange::Clear => None,
        }
    }
}

impl fmt::Display for PriorityChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityChange::Set(value) => write!(f, "{value}"),
            PriorityChange::Clear => f.write_str("null"),
        }
    }
}

/// Priority scale in force for a workflow location. Objects being followed
/// are ranked for observation; everything else for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityScale {
    Observation,
    Classification,
}

impl PriorityScale {
    pub fn for_location(mwl: MarshallWorkflowLocation) -> Self {
        match mwl {
            MarshallWorkflowLocation::Following => PriorityScale::Observation,
            _ => PriorityScale::Classification,
        }
    }

    fn words(self) -> &'static [&'static str] {
        match self {
            PriorityScale::Observation => &["CRITICAL", "IMPORTANT", "USEFUL", "NONE"],
            PriorityScale::Classification => &["HIGH", "MEDIUM", "LOW"],
        }
    }

    /// Prefix used in history log messages
    pub fn noun(self) -> &'static str {
        match self {
            PriorityScale::Observation => "observation priority",
            PriorityScale::Classification => "classification priority",
        }
    }

    /// Word for a stored priority; values off the scale render as the raw
    /// integer, absent values as `unset`
    pub fn label(self, priority: Option<i64>) -> String {
        match priority {
            None => "unset".to_string(),
            Some(value) => usize::try_from(value)
                .ok()
                .and_then(|v| v.checked_sub(1))
                .and_then(|index| self.words().get(index))
                .map(|word| word.to_string())
                .unwrap_or_else(|| value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_following_uses_observation_words() {
        let scale = PriorityScale::for_location(MarshallWorkflowLocation::Following);
        assert_eq!(scale.label(Some(1)), "CRITICAL");
        assert_eq!(scale.label(Some(4)), "NONE");
        assert_eq!(scale.label(Some(5)), "5");
    }

    #[test]
    fn test_other_locations_use_classification_words() {
        for mwl in MarshallWorkflowLocation::ALL {
            if mwl == MarshallWorkflowLocation::Following {
                continue;
            }
            let scale = PriorityScale::for_location(mwl);
            assert_eq!(scale.label(Some(1)), "HIGH");
            assert_eq!(scale.label(Some(3)), "LOW");
            assert_eq!(scale.label(Some(4)), "4");
        }
        assert_eq!(PriorityScale::Classification.label(Some(0)), "0");
        assert_eq!(PriorityScale::Classification.label(Some(-2)), "-2");
        assert_eq!(PriorityScale::Classification.label(None), "unset");
    }

    #[test]
    fn test_parse_raw_priority() {
        assert_eq!(PriorityChange::parse(" 2 ").unwrap(), PriorityChange::Set(2));
        assert_eq!(PriorityChange::parse("False").unwrap(), PriorityChange::Clear);
        assert_eq!(PriorityChange::parse("").unwrap(), PriorityChange::Clear);
        let err = PriorityChange::parse("high").unwrap_err();
        assert_eq!(err.kind(), crate::workflow::errors::ErrorKind::ValidationError);
    }
}
