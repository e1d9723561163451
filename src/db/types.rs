use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "difficultylevel", rename_all = "lowercase")]
pub(crate) enum DifficultyLevel {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// Outcome label stored with every recorded answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "errortype", rename_all = "snake_case")]
pub(crate) enum ErrorType {
    Correct,
    Unanswered,
    FormatError,
    ConceptualError,
    ComputationError,
    PrecisionDeviation,
}

impl ErrorType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Unanswered => "unanswered",
            Self::FormatError => "format_error",
            Self::ConceptualError => "conceptual_error",
            Self::ComputationError => "computation_error",
            Self::PrecisionDeviation => "precision_deviation",
        }
    }
}
