use std::collections::BTreeMap;

const MAX_MAGNITUDE: f64 = 1e6;
const MIN_MAGNITUDE: f64 = 1e-8;
const MAX_RATIO: f64 = 1000.0;
const MIN_RATIO: f64 = 0.001;

pub(crate) fn is_plausible(answers: &[f64], variables: &BTreeMap<String, f64>, attempt: u32) -> bool {
    if answers.is_empty() {
        return false;
    }

    let attempt = f64::from(attempt);
    let magnitude_slack = 1.0 + 0.2 * attempt;
    let ratio_slack = 1.0 + 0.3 * attempt;
    let mean_magnitude = mean_abs(variables);

    answers.iter().all(|&answer| {
        if !answer.is_finite() {
            return false;
        }

        let magnitude = answer.abs();
        // Exact zero is a legitimate answer (e.g. "no current flows").
        if magnitude == 0.0 {
            return true;
        }
        if magnitude > MAX_MAGNITUDE * magnitude_slack
            || magnitude < MIN_MAGNITUDE / magnitude_slack
        {
            return false;
        }

        match mean_magnitude {
            None => true,
            Some(mean) => {
                let ratio = if mean == 0.0 { magnitude } else { magnitude / mean };
                (MIN_RATIO / ratio_slack..=MAX_RATIO * ratio_slack).contains(&ratio)
            }
        }
    })
}

fn mean_abs(variables: &BTreeMap<String, f64>) -> Option<f64> {
    if variables.is_empty() {
        return None;
    }
    let total: f64 = variables.values().map(|value| value.abs()).sum();
    Some(total / variables.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_variables() -> BTreeMap<String, f64> {
        BTreeMap::from([("a".to_string(), 1.0), ("b".to_string(), -1.0)])
    }

    #[test]
    fn empty_answers_are_rejected() {
        assert!(!is_plausible(&[], &unit_variables(), 0));
    }

    #[test]
    fn non_finite_answers_are_rejected_at_any_attempt() {
        assert!(!is_plausible(&[f64::NAN], &unit_variables(), 0));
        assert!(!is_plausible(&[1.0, f64::INFINITY], &unit_variables(), 50));
    }

    #[test]
    fn huge_answer_against_unit_variables_needs_many_attempts() {
        let variables = unit_variables();
        assert!(!is_plausible(&[1e7], &variables, 0));
        assert!(!is_plausible(&[1e7], &variables, 9));
        // 1000 * (1 + 0.3a) >= 1e7 once a >= 33_330; the magnitude bound is
        // already loose enough by then.
        assert!(is_plausible(&[1e7], &variables, 40_000));
    }

    #[test]
    fn tiny_magnitudes_are_rejected_but_zero_is_not() {
        let variables = BTreeMap::new();
        assert!(!is_plausible(&[1e-9], &variables, 0));
        assert!(!is_plausible(&[1e-9], &variables, 1));
        assert!(is_plausible(&[1e-9], &variables, 50));
        assert!(is_plausible(&[0.0], &unit_variables(), 0));
        assert!(is_plausible(&[12.5, 0.0, -3.0], &unit_variables(), 0));
    }

    #[test]
    fn ratio_check_is_skipped_without_variables() {
        assert!(is_plausible(&[5e5], &BTreeMap::new(), 0));
        assert!(!is_plausible(&[5e5], &unit_variables(), 0));
    }

    #[test]
    fn zero_mean_uses_raw_magnitude() {
        let variables = BTreeMap::from([("x".to_string(), 0.0)]);
        assert!(is_plausible(&[2.0], &variables, 0));
        assert!(!is_plausible(&[2000.0], &variables, 0));
    }

    #[test]
    fn ratio_lower_bound_applies() {
        let variables = BTreeMap::from([("rho".to_string(), 5000.0)]);
        assert!(!is_plausible(&[1.0], &variables, 0));
        assert!(is_plausible(&[10.0], &variables, 0));
    }
}
