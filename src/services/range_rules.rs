use serde::{Deserialize, Serialize};

/// Inclusive sampling interval for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(crate) struct ValueRange {
    pub(crate) min: f64,
    pub(crate) max: f64,
}

impl ValueRange {
    pub(crate) const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Widens the interval for a retry: `[max(0.01, min / f), max * f]` with
    /// `f = 1 + 0.1 * attempt`.
    pub(crate) fn expanded(self, attempt: u32) -> Self {
        let factor = 1.0 + f64::from(attempt) * 0.1;
        Self { min: (self.min / factor).max(0.01), max: self.max * factor }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RangeRule {
    pub(crate) label: &'static str,
    needles: Vec<String>,
    pub(crate) range: ValueRange,
}

impl RangeRule {
    pub(crate) fn new(label: &'static str, needles: &[&str], range: ValueRange) -> Self {
        Self {
            label,
            needles: needles.iter().map(|needle| needle.to_lowercase()).collect(),
            range,
        }
    }

    pub(crate) fn matches(&self, variable: &str) -> bool {
        let name = variable.to_lowercase();
        self.needles.iter().any(|needle| name.contains(needle.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RangeRules {
    rules: Vec<RangeRule>,
    fallback: ValueRange,
}

pub(crate) const GENERIC_RANGE: ValueRange = ValueRange::new(0.5, 20.0);

impl Default for RangeRules {
    fn default() -> Self {
        Self::new(
            vec![
                RangeRule::new(
                    "geometric",
                    &["r", "a", "l", "d", "x", "h"],
                    ValueRange::new(0.1, 10.0),
                ),
                RangeRule::new(
                    "velocity",
                    &["v", "u", "w", "speed", "velocity"],
                    ValueRange::new(1.0, 50.0),
                ),
                RangeRule::new("field", &["b", "e", "f", "field"], ValueRange::new(0.1, 5.0)),
                RangeRule::new("current", &["i", "current"], ValueRange::new(0.1, 10.0)),
                RangeRule::new("resistance", &["r", "resistance"], ValueRange::new(1.0, 100.0)),
                RangeRule::new("mass", &["m", "mass"], ValueRange::new(0.01, 5.0)),
                RangeRule::new(
                    "angular_rate",
                    &["omega", "ω", "angular"],
                    ValueRange::new(1.0, 20.0),
                ),
                RangeRule::new(
                    "rate_of_change",
                    &["dbdt", "alpha", "rate"],
                    ValueRange::new(0.1, 10.0),
                ),
                RangeRule::new("density", &["density"], ValueRange::new(1000.0, 10000.0)),
            ],
            GENERIC_RANGE,
        )
    }
}

impl RangeRules {
    pub(crate) fn new(rules: Vec<RangeRule>, fallback: ValueRange) -> Self {
        Self { rules, fallback }
    }

    /// First matching rule wins.
    pub(crate) fn classify(&self, variable: &str) -> Option<&RangeRule> {
        self.rules.iter().find(|rule| rule.matches(variable))
    }

    pub(crate) fn range_for(&self, variable: &str) -> ValueRange {
        self.classify(variable).map(|rule| rule.range).unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        let rules = RangeRules::default();
        // "R" contains "r" and is caught by the geometric rule before resistance.
        assert_eq!(rules.classify("R").map(|rule| rule.label), Some("geometric"));
        assert_eq!(rules.classify("v").map(|rule| rule.label), Some("velocity"));
        assert_eq!(rules.classify("B0").map(|rule| rule.label), Some("field"));
        assert_eq!(rules.classify("i").map(|rule| rule.label), Some("current"));
        assert_eq!(rules.classify("m").map(|rule| rule.label), Some("mass"));
        assert_eq!(rules.classify("ω").map(|rule| rule.label), Some("angular_rate"));
    }

    #[test]
    fn unmatched_names_get_generic_range() {
        let rules = RangeRules::default();
        assert_eq!(rules.range_for("k"), GENERIC_RANGE);
        assert_eq!(rules.range_for("q"), GENERIC_RANGE);
    }

    #[test]
    fn custom_rule_order_is_respected() {
        let rules = RangeRules::new(
            vec![
                RangeRule::new("density", &["density"], ValueRange::new(1000.0, 10000.0)),
                RangeRule::new("geometric", &["d"], ValueRange::new(0.1, 10.0)),
            ],
            GENERIC_RANGE,
        );
        assert_eq!(rules.range_for("Density"), ValueRange::new(1000.0, 10000.0));
        assert_eq!(rules.range_for("d"), ValueRange::new(0.1, 10.0));
    }

    #[test]
    fn expansion_widens_and_keeps_floor() {
        let base = ValueRange::new(0.1, 10.0);
        assert_eq!(base.expanded(0), base);

        let widened = base.expanded(5);
        assert!((widened.max - 15.0).abs() < 1e-12);
        assert!((widened.min - 0.1 / 1.5).abs() < 1e-12);

        let floored = ValueRange::new(0.01, 5.0).expanded(9);
        assert_eq!(floored.min, 0.01);
    }
}
