use std::collections::BTreeMap;
use std::sync::OnceLock;

use rand::Rng;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::db::models::ProblemTemplate;
use crate::services::formula::Formula;
use crate::services::plausibility::is_plausible;
use crate::services::range_rules::{RangeRules, ValueRange};

pub(crate) const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const FALLBACK_RANGE: ValueRange = ValueRange::new(1.0, 3.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ProblemInstance {
    pub(crate) template_id: i64,
    pub(crate) template_name: String,
    pub(crate) problem_text: String,
    pub(crate) variables: BTreeMap<String, f64>,
    pub(crate) correct_answers: Vec<f64>,
    pub(crate) answer_units: Vec<String>,
    pub(crate) answer_count: usize,
    pub(crate) image_filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GenerationOutcome {
    Accepted { attempt: u32 },
    Fallback,
}

#[derive(Debug)]
enum GenerationState {
    Sampling { attempt: u32 },
    Accepted { attempt: u32, instance: ProblemInstance },
    FallbackAccepted { instance: ProblemInstance },
}

#[derive(Debug, Clone)]
pub(crate) struct ProblemGenerator {
    rules: RangeRules,
    max_attempts: u32,
}

impl Default for ProblemGenerator {
    fn default() -> Self {
        Self::new(RangeRules::default(), DEFAULT_MAX_ATTEMPTS)
    }
}

impl ProblemGenerator {
    pub(crate) fn new(rules: RangeRules, max_attempts: u32) -> Self {
        Self { rules, max_attempts }
    }

    pub(crate) fn generate(&self, template: &ProblemTemplate, rng: &mut impl Rng) -> ProblemInstance {
        self.generate_with_outcome(template, rng).0
    }

    pub(crate) fn generate_with_outcome(
        &self,
        template: &ProblemTemplate,
        rng: &mut impl Rng,
    ) -> (ProblemInstance, GenerationOutcome) {
        let job = Job::new(template);

        let formula = match Formula::parse(&template.solution_formula) {
            Ok(formula) => Some(formula),
            Err(err) => {
                tracing::warn!(
                    template_id = template.id,
                    error = %err,
                    "Template formula does not parse; using fallback instance"
                );
                None
            }
        };

        let mut state = match formula {
            Some(_) => GenerationState::Sampling { attempt: 0 },
            None => GenerationState::FallbackAccepted {
                instance: job.fallback(None, &sample_uniform(&job.names, FALLBACK_RANGE, rng)),
            },
        };

        loop {
            state = match state {
                GenerationState::Sampling { attempt } if attempt >= self.max_attempts => {
                    let values = sample_uniform(&job.names, FALLBACK_RANGE, rng);
                    GenerationState::FallbackAccepted {
                        instance: job.fallback(formula.as_ref(), &values),
                    }
                }
                GenerationState::Sampling { attempt } => {
                    let values = self.sample_attempt(&job.names, attempt, rng);
                    match formula.as_ref().and_then(|formula| job.attempt(formula, values, attempt))
                    {
                        Some(instance) => GenerationState::Accepted { attempt, instance },
                        None => GenerationState::Sampling { attempt: attempt + 1 },
                    }
                }
                GenerationState::Accepted { attempt, instance } => {
                    tracing::debug!(
                        template_id = template.id,
                        attempt,
                        "Generated problem instance"
                    );
                    return (instance, GenerationOutcome::Accepted { attempt });
                }
                GenerationState::FallbackAccepted { instance } => {
                    tracing::warn!(
                        template_id = template.id,
                        attempts = self.max_attempts,
                        "No plausible instance found; accepted fallback instance"
                    );
                    metrics::counter!(
                        "problem_generation_fallbacks_total",
                        "template_id" => template.id.to_string()
                    )
                    .increment(1);
                    return (instance, GenerationOutcome::Fallback);
                }
            };
        }
    }

    fn sample_attempt(
        &self,
        names: &[String],
        attempt: u32,
        rng: &mut impl Rng,
    ) -> BTreeMap<String, f64> {
        names
            .iter()
            .map(|name| {
                let range = self.rules.range_for(name).expanded(attempt);
                (name.clone(), sample_value(range, rng))
            })
            .collect()
    }
}

/// Per-call view of the template with its derived lists.
struct Job<'a> {
    template: &'a ProblemTemplate,
    names: Vec<String>,
    answer_count: usize,
}

impl<'a> Job<'a> {
    fn new(template: &'a ProblemTemplate) -> Self {
        Self {
            template,
            names: split_list(&template.variables),
            answer_count: usize::try_from(template.answer_count).unwrap_or(1).max(1),
        }
    }

    fn attempt(
        &self,
        formula: &Formula,
        values: BTreeMap<String, f64>,
        attempt: u32,
    ) -> Option<ProblemInstance> {
        let answers = match formula.evaluate(&values) {
            Ok(answers) => normalize_count(answers, self.answer_count),
            Err(err) => {
                tracing::debug!(
                    template_id = self.template.id,
                    attempt,
                    error = %err,
                    "Formula evaluation failed; retrying"
                );
                return None;
            }
        };

        if !is_plausible(&answers, &values, attempt) {
            return None;
        }

        Some(self.build(values, answers))
    }

    fn fallback(&self, formula: Option<&Formula>, values: &BTreeMap<String, f64>) -> ProblemInstance {
        let answers = formula
            .and_then(|formula| formula.evaluate(values).ok())
            .map(|answers| normalize_count(answers, self.answer_count))
            .filter(|answers| answers.iter().all(|value| value.is_finite()))
            .unwrap_or_else(|| vec![0.0; self.answer_count]);

        self.build(values.clone(), answers)
    }

    fn build(&self, values: BTreeMap<String, f64>, answers: Vec<f64>) -> ProblemInstance {
        let mut units = self.template.answer_units.as_deref().map(split_units).unwrap_or_default();
        units.resize(self.answer_count, String::new());

        ProblemInstance {
            template_id: self.template.id,
            template_name: self.template.name.clone(),
            problem_text: render_problem_text(&self.template.problem_text, &values),
            variables: values,
            correct_answers: answers.into_iter().map(round_for_display).collect(),
            answer_units: units,
            answer_count: self.answer_count,
            image_filename: self.template.image_filename.clone(),
        }
    }
}

fn sample_uniform(
    names: &[String],
    range: ValueRange,
    rng: &mut impl Rng,
) -> BTreeMap<String, f64> {
    names.iter().map(|name| (name.clone(), sample_value(range, rng))).collect()
}

fn sample_value(range: ValueRange, rng: &mut impl Rng) -> f64 {
    let value = if range.max > range.min { rng.gen_range(range.min..=range.max) } else { range.min };
    round_to(value, 2)
}

/// Any mismatch between produced and declared answer counts repeats the
/// first value; a scalar formula is thereby broadcast.
fn normalize_count(answers: Vec<f64>, answer_count: usize) -> Vec<f64> {
    if answers.len() == answer_count {
        return answers;
    }
    let first = answers.first().copied().unwrap_or(f64::NAN);
    vec![first; answer_count]
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty()).map(String::from).collect()
}

fn split_units(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|unit| unit.trim().to_string()).collect()
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"__(\w+)__").expect("placeholder pattern compiles"))
}

/// Replaces `__name__` with the sampled value; unknown placeholders stay.
pub(crate) fn render_problem_text(text: &str, values: &BTreeMap<String, f64>) -> String {
    placeholder_pattern()
        .replace_all(text, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(value) => format_value(*value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Whole numbers keep one decimal so `3.0` does not read as an integer
/// count in problem text.
fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

pub(crate) fn round_for_display(value: f64) -> f64 {
    let magnitude = value.abs();
    if magnitude == 0.0 {
        0.0
    } else if magnitude >= 1000.0 {
        round_to(value, 0)
    } else if magnitude >= 1.0 {
        round_to(value, 2)
    } else if magnitude >= 0.01 {
        round_to(value, 4)
    } else {
        round_to(value, 6)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::core::time::primitive_now_utc;
    use crate::db::types::DifficultyLevel;

    fn template(
        variables: &str,
        formula: &str,
        answer_count: i32,
        units: Option<&str>,
    ) -> ProblemTemplate {
        let now = primitive_now_utc();
        ProblemTemplate {
            id: 7,
            name: "Rotating rod".to_string(),
            problem_text: "A rod of length __l__ m spins at __omega__ rad/s in __B__ T; __q__."
                .to_string(),
            variables: variables.to_string(),
            solution_formula: formula.to_string(),
            answer_count,
            answer_units: units.map(String::from),
            difficulty: DifficultyLevel::Medium,
            image_filename: Some("rod.png".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn is_two_decimal(value: f64) -> bool {
        ((value * 100.0).round() - value * 100.0).abs() < 1e-6
    }

    #[test]
    fn accepted_instance_matches_template() {
        let generator = ProblemGenerator::default();
        let template = template(
            "l, B, omega",
            "(3/8) * B * omega * l**2, -(3/8) * B * omega * l**2,0",
            3,
            Some("V,V"),
        );
        let mut rng = StdRng::seed_from_u64(42);

        let (instance, outcome) = generator.generate_with_outcome(&template, &mut rng);

        assert!(matches!(outcome, GenerationOutcome::Accepted { .. }));
        assert_eq!(instance.template_id, 7);
        assert_eq!(instance.answer_count, 3);
        assert_eq!(instance.correct_answers.len(), 3);
        assert_eq!(instance.answer_units, vec!["V", "V", ""]);
        assert_eq!(instance.correct_answers[2], 0.0);
        assert_eq!(instance.correct_answers[0], -instance.correct_answers[1]);
        assert_eq!(instance.variables.len(), 3);
        assert!(instance.variables.values().all(|value| is_two_decimal(*value)));
        assert!(!instance.problem_text.contains("__l__"));
        assert!(instance.problem_text.contains("__q__"));
        assert_eq!(instance.image_filename.as_deref(), Some("rod.png"));
    }

    #[test]
    fn sampled_values_stay_in_expanded_range() {
        let generator = ProblemGenerator::default();
        let mut rng = StdRng::seed_from_u64(3);
        for attempt in [0, 4, 9] {
            let values = generator.sample_attempt(&["v".to_string()], attempt, &mut rng);
            let expansion = 1.0 + 0.1 * f64::from(attempt);
            let value = values["v"];
            assert!(value >= (1.0 / expansion).max(0.01) - 0.005, "{value}");
            assert!(value <= 50.0 * expansion + 0.005, "{value}");
        }
    }

    #[test]
    fn scalar_formula_is_broadcast_to_answer_count() {
        let generator = ProblemGenerator::default();
        let template = template("l, B", "B * l", 2, None);
        let instance = generator.generate(&template, &mut StdRng::seed_from_u64(1));

        assert_eq!(instance.correct_answers.len(), 2);
        assert_eq!(instance.correct_answers[0], instance.correct_answers[1]);
        assert_eq!(instance.answer_units, vec!["", ""]);
    }

    #[test]
    fn implausible_template_falls_back_with_declared_count() {
        let generator = ProblemGenerator::default();
        // Always ~1e12 times the mean input, far outside every attempt's window.
        let template = template("l", "l * 1e12", 2, Some("J, J, J"));
        let (instance, outcome) =
            generator.generate_with_outcome(&template, &mut StdRng::seed_from_u64(9));

        assert_eq!(outcome, GenerationOutcome::Fallback);
        assert_eq!(instance.correct_answers.len(), 2);
        assert_eq!(instance.answer_units, vec!["J", "J"]);
        let l = instance.variables["l"];
        assert!((1.0..=3.0).contains(&l));
        assert_eq!(instance.correct_answers[0], round_for_display(l * 1e12));
    }

    #[test]
    fn broken_formula_falls_back_to_zeros() {
        let generator = ProblemGenerator::default();
        for formula in ["l / (l - l)", "l +", "unknown_fn(l)"] {
            let template = template("l", formula, 3, None);
            let (instance, outcome) =
                generator.generate_with_outcome(&template, &mut StdRng::seed_from_u64(5));
            assert_eq!(outcome, GenerationOutcome::Fallback, "{formula}");
            assert_eq!(instance.correct_answers, vec![0.0, 0.0, 0.0], "{formula}");
        }
    }

    #[test]
    fn template_without_variables_skips_ratio_check() {
        let generator = ProblemGenerator::default();
        let template = template("", "1, 0", 2, None);
        let (instance, outcome) =
            generator.generate_with_outcome(&template, &mut StdRng::seed_from_u64(0));

        assert_eq!(outcome, GenerationOutcome::Accepted { attempt: 0 });
        assert_eq!(instance.correct_answers, vec![1.0, 0.0]);
        assert!(instance.variables.is_empty());
    }

    #[test]
    fn same_seed_gives_same_instance() {
        let generator = ProblemGenerator::default();
        let template = template("r, R, i", "i * R / (pi * (r/100)**2)", 1, Some("T"));
        let first = generator.generate(&template, &mut StdRng::seed_from_u64(11));
        let second = generator.generate(&template, &mut StdRng::seed_from_u64(11));
        assert_eq!(first, second);
    }

    #[test]
    fn renders_placeholders() {
        let values = BTreeMap::from([("v".to_string(), 12.5), ("L".to_string(), 3.0)]);
        assert_eq!(
            render_problem_text("__v__ km/h over __L__ m, __x__", &values),
            "12.5 km/h over 3.0 m, __x__"
        );
    }

    #[test]
    fn display_rounding_tiers() {
        assert_eq!(round_for_display(0.0), 0.0);
        assert_eq!(round_for_display(12345.678), 12346.0);
        assert_eq!(round_for_display(-3.14159), -3.14);
        assert_eq!(round_for_display(0.0123456), 0.0123);
        assert_eq!(round_for_display(0.00123456), 0.001235);
    }

    #[test]
    fn splits_lists_and_drops_empty_names() {
        assert_eq!(split_list(" r, R ,, i "), vec!["r", "R", "i"]);
        assert!(split_list("").is_empty());
        assert_eq!(split_units("V, ,A"), vec!["V", "", "A"]);
    }
}
