use serde_json::Value;

use crate::db::types::ErrorType;

/// Relative error allowed, in percent.
const BASE_TOLERANCE_PERCENT: f64 = 1.0;
/// Answers beyond 1e10 or below 1e-10 in magnitude get a looser tolerance.
const EXTREME_MAGNITUDE_LOG10: f64 = 10.0;

const CONCEPTUAL_ERROR_PERCENT: f64 = 50.0;
const COMPUTATION_ERROR_PERCENT: f64 = 5.0;

/// A submitted answer as it arrived on the wire.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UserAnswer {
    Missing,
    Malformed(String),
    Value { value: f64, raw: String },
}

impl UserAnswer {
    /// Numbers and numeric strings are values; `null`, empty strings and
    /// absent entries are missing; everything else is malformed.
    pub(crate) fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::Missing,
            Some(Value::Number(number)) => match number.as_f64() {
                Some(parsed) if parsed.is_finite() => {
                    Self::Value { value: parsed, raw: number.to_string() }
                }
                _ => Self::Malformed(number.to_string()),
            },
            Some(Value::String(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Self::Missing;
                }
                match trimmed.parse::<f64>() {
                    Ok(parsed) if parsed.is_finite() => {
                        Self::Value { value: parsed, raw: trimmed.to_string() }
                    }
                    _ => Self::Malformed(trimmed.to_string()),
                }
            }
            Some(other) => Self::Malformed(other.to_string()),
        }
    }

    pub(crate) fn value(&self) -> Option<f64> {
        match self {
            Self::Value { value, .. } => Some(*value),
            Self::Missing | Self::Malformed(_) => None,
        }
    }

    pub(crate) fn raw(&self) -> Option<&str> {
        match self {
            Self::Missing => None,
            Self::Malformed(raw) | Self::Value { raw, .. } => Some(raw),
        }
    }
}

/// Tolerance check of a single answer.
pub(crate) fn grade(user: Option<f64>, correct: Option<f64>) -> bool {
    let (Some(user), Some(correct)) = (user, correct) else {
        return false;
    };

    if user == 0.0 && correct == 0.0 {
        return true;
    }
    if user == 0.0 || correct == 0.0 {
        return user == correct;
    }

    relative_error_percent(user, correct) <= tolerance_percent(correct)
}

fn tolerance_percent(correct: f64) -> f64 {
    let magnitude = correct.abs().log10();
    if magnitude > EXTREME_MAGNITUDE_LOG10 || magnitude < -EXTREME_MAGNITUDE_LOG10 {
        (BASE_TOLERANCE_PERCENT * 1.5).min(2.0)
    } else {
        BASE_TOLERANCE_PERCENT
    }
}

fn relative_error_percent(user: f64, correct: f64) -> f64 {
    (user - correct).abs() / correct.abs() * 100.0
}

pub(crate) fn classify(answer: &UserAnswer, correct: f64, is_correct: bool) -> ErrorType {
    if is_correct {
        return ErrorType::Correct;
    }

    let user = match answer {
        UserAnswer::Missing => return ErrorType::Unanswered,
        UserAnswer::Malformed(_) => return ErrorType::FormatError,
        UserAnswer::Value { value, .. } => *value,
    };

    if correct == 0.0 {
        return if user == 0.0 { ErrorType::Correct } else { ErrorType::ComputationError };
    }

    let relative = relative_error_percent(user, correct);
    if relative > CONCEPTUAL_ERROR_PERCENT {
        ErrorType::ConceptualError
    } else if relative > COMPUTATION_ERROR_PERCENT {
        ErrorType::ComputationError
    } else {
        ErrorType::PrecisionDeviation
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AnswerGrade {
    pub(crate) index: usize,
    pub(crate) answer: UserAnswer,
    pub(crate) correct_answer: f64,
    pub(crate) is_correct: bool,
    pub(crate) error_type: ErrorType,
}

/// Grades every declared answer; submitted entries past the declared count
/// are ignored and missing ones count as unanswered.
pub(crate) fn grade_submission(submitted: &[Value], correct_answers: &[f64]) -> Vec<AnswerGrade> {
    correct_answers
        .iter()
        .enumerate()
        .map(|(index, &correct_answer)| {
            let answer = UserAnswer::from_json(submitted.get(index));
            let is_correct = grade(answer.value(), Some(correct_answer));
            let error_type = classify(&answer, correct_answer, is_correct);
            AnswerGrade { index, answer, correct_answer, is_correct, error_type }
        })
        .collect()
}
