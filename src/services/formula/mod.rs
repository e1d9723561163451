mod eval;
mod lexer;
mod parser;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use self::parser::Expr;

#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum FormulaError {
    #[error("formula is empty")]
    Empty,
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("tuples are only allowed at the top level or as integration bounds")]
    NestedTuple,
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    Arity { name: String, expected: &'static str, found: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("math domain error in {0}")]
    Domain(String),
    #[error("integrate needs explicit bounds: integrate(expr, (var, lower, upper))")]
    IndefiniteIntegral,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Formula {
    outputs: Vec<Expr>,
}

impl Formula {
    pub(crate) fn parse(source: &str) -> Result<Self, FormulaError> {
        let tokens = lexer::tokenize(source)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty);
        }
        let outputs = parser::parse(&tokens)?;
        Ok(Self { outputs })
    }

    /// Number of values the formula produces.
    pub(crate) fn arity(&self) -> usize {
        self.outputs.len()
    }

    pub(crate) fn evaluate(
        &self,
        variables: &BTreeMap<String, f64>,
    ) -> Result<Vec<f64>, FormulaError> {
        let mut scope = eval::Scope::new(variables);
        self.outputs.iter().map(|expr| eval::evaluate(expr, &mut scope)).collect()
    }

    /// Free symbols referenced by the formula, excluding integration
    /// variables and built-in constants.
    pub(crate) fn free_symbols(&self) -> BTreeSet<String> {
        let mut symbols = BTreeSet::new();
        for expr in &self.outputs {
            eval::collect_free_symbols(expr, &mut Vec::new(), &mut symbols);
        }
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(name, value)| (name.to_string(), *value)).collect()
    }

    fn eval(source: &str, pairs: &[(&str, f64)]) -> Result<Vec<f64>, FormulaError> {
        Formula::parse(source)?.evaluate(&vars(pairs))
    }

    fn assert_close(actual: f64, expected: f64) {
        let scale = expected.abs().max(1.0);
        assert!((actual - expected).abs() <= 1e-9 * scale, "expected {expected}, got {actual}");
    }

    #[test]
    fn evaluates_induced_current_formula() {
        let result = eval("i * R / (pi * (r/100)**2)", &[("i", 2.0), ("R", 5.0), ("r", 10.0)])
            .expect("evaluate");
        assert_eq!(result.len(), 1);
        assert_close(result[0], 10.0 / (std::f64::consts::PI * 0.01));
    }

    #[test]
    fn top_level_tuple_yields_one_value_per_element() {
        let result = eval(
            "(3/8) * B * omega * l**2, -(3/8) * B * omega * l**2,0",
            &[("B", 2.0), ("omega", 4.0), ("l", 1.0)],
        )
        .expect("evaluate");
        assert_eq!(result, vec![3.0, -3.0, 0.0]);
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_unary_minus() {
        assert_eq!(eval("2**3**2", &[]).unwrap(), vec![512.0]);
        assert_eq!(eval("-2**2", &[]).unwrap(), vec![-4.0]);
        assert_eq!(eval("2**-1", &[]).unwrap(), vec![0.5]);
    }

    #[test]
    fn module_prefixes_are_accepted() {
        let result = eval("sp.sqrt(x) + math.log(E)", &[("x", 16.0)]).expect("evaluate");
        assert_close(result[0], 5.0);
    }

    #[test]
    fn variables_shadow_constants() {
        assert_eq!(eval("E * 2", &[("E", 3.0)]).unwrap(), vec![6.0]);
    }

    #[test]
    fn log_with_base() {
        assert_close(eval("log(1000, 10)", &[]).unwrap()[0], 3.0);
    }

    #[test]
    fn definite_integral_is_numeric() {
        let result = eval("integrate(x**2, (x, 0, a))", &[("a", 3.0)]).expect("evaluate");
        assert_close(result[0], 9.0);

        let result = eval("integrate(sin(t), (t, 0, pi))", &[]).expect("evaluate");
        assert!((result[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn integration_variable_is_not_free_outside_integrand() {
        let err = eval("integrate(x, (x, 0, 1)) + x", &[]).unwrap_err();
        assert_eq!(err, FormulaError::UnknownSymbol("x".to_string()));
    }

    #[test]
    fn indefinite_integral_is_rejected() {
        assert_eq!(eval("integrate(x**2, x)", &[]).unwrap_err(), FormulaError::IndefiniteIntegral);
    }

    #[test]
    fn division_by_zero_and_domain_errors() {
        assert_eq!(eval("1 / (a - a)", &[("a", 2.0)]).unwrap_err(), FormulaError::DivisionByZero);
        assert!(matches!(eval("sqrt(-1)", &[]).unwrap_err(), FormulaError::Domain(_)));
        assert!(matches!(eval("log(0 - 2)", &[]).unwrap_err(), FormulaError::Domain(_)));
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert_eq!(Formula::parse("   ").unwrap_err(), FormulaError::Empty);
        assert_eq!(Formula::parse("1 +").unwrap_err(), FormulaError::UnexpectedEnd);
        assert!(matches!(
            Formula::parse("1 ^ 2").unwrap_err(),
            FormulaError::UnexpectedChar { ch: '^', .. }
        ));
        assert!(matches!(Formula::parse("(1 + 2").unwrap_err(), FormulaError::UnexpectedEnd));
        assert_eq!(Formula::parse("1 + (2, 3)").unwrap_err(), FormulaError::NestedTuple);
    }

    #[test]
    fn unknown_names_fail_at_evaluation() {
        assert_eq!(eval("q * 2", &[]).unwrap_err(), FormulaError::UnknownSymbol("q".to_string()));
        assert_eq!(
            eval("frobnicate(2)", &[]).unwrap_err(),
            FormulaError::UnknownFunction("frobnicate".to_string())
        );
        assert!(matches!(eval("sin(1, 2)", &[]).unwrap_err(), FormulaError::Arity { .. }));
    }

    #[test]
    fn free_symbols_skip_constants_and_bound_variables() {
        let formula = Formula::parse("B * v * (AC/100) + integrate(h * k, (h, 0, 1)) * pi")
            .expect("parse");
        let symbols: Vec<String> = formula.free_symbols().into_iter().collect();
        assert_eq!(symbols, vec!["AC", "B", "k", "v"]);
        assert_eq!(formula.arity(), 1);
    }
}
