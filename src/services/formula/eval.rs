use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts;

use super::parser::{BinaryOp, Expr};
use super::FormulaError;

/// Even number of Simpson sub-intervals used by `integrate`.
const SIMPSON_INTERVALS: usize = 1000;

const MODULE_PREFIXES: &[&str] = &["sp.", "math.", "np.", "sympy.", "numpy."];

pub(super) struct Scope<'a> {
    variables: &'a BTreeMap<String, f64>,
    bound: Vec<(String, f64)>,
}

impl<'a> Scope<'a> {
    pub(super) fn new(variables: &'a BTreeMap<String, f64>) -> Self {
        Self { variables, bound: Vec::new() }
    }

    fn lookup(&self, name: &str) -> Result<f64, FormulaError> {
        if let Some((_, value)) = self.bound.iter().rev().find(|(bound, _)| bound == name) {
            return Ok(*value);
        }
        if let Some(value) = self.variables.get(name) {
            return Ok(*value);
        }
        constant(strip_module(name)).ok_or_else(|| FormulaError::UnknownSymbol(name.to_string()))
    }
}

fn strip_module(name: &str) -> &str {
    MODULE_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(consts::PI),
        "E" => Some(consts::E),
        _ => None,
    }
}

pub(super) fn evaluate(expr: &Expr, scope: &mut Scope<'_>) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Symbol(name) => scope.lookup(name),
        Expr::Neg(inner) => Ok(-evaluate(inner, scope)?),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, scope)?;
            let rhs = evaluate(rhs, scope)?;
            binary(*op, lhs, rhs)
        }
        Expr::Call { name, args } => call(name, args, scope),
        Expr::Tuple(_) => Err(FormulaError::NestedTuple),
    }
}

fn binary(op: BinaryOp, lhs: f64, rhs: f64) -> Result<f64, FormulaError> {
    let value = match op {
        BinaryOp::Add => lhs + rhs,
        BinaryOp::Sub => lhs - rhs,
        BinaryOp::Mul => lhs * rhs,
        BinaryOp::Div => {
            if rhs == 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            lhs / rhs
        }
        BinaryOp::Pow => {
            if lhs == 0.0 && rhs < 0.0 {
                return Err(FormulaError::DivisionByZero);
            }
            lhs.powf(rhs)
        }
    };
    checked("arithmetic", value)
}

fn checked(context: &str, value: f64) -> Result<f64, FormulaError> {
    if value.is_nan() {
        Err(FormulaError::Domain(context.to_string()))
    } else {
        Ok(value)
    }
}

fn call(name: &str, args: &[Expr], scope: &mut Scope<'_>) -> Result<f64, FormulaError> {
    let function = strip_module(name);
    if function == "integrate" {
        return integrate(args, scope);
    }

    let values =
        args.iter().map(|arg| evaluate(arg, scope)).collect::<Result<Vec<f64>, FormulaError>>()?;

    let unary = |f: fn(f64) -> f64| -> Result<f64, FormulaError> {
        match values.as_slice() {
            [x] => checked(function, f(*x)),
            _ => Err(FormulaError::Arity {
                name: function.to_string(),
                expected: "1",
                found: values.len(),
            }),
        }
    };

    match function {
        "sqrt" => unary(f64::sqrt),
        "exp" => unary(f64::exp),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "asin" => unary(f64::asin),
        "acos" => unary(f64::acos),
        "atan" => unary(f64::atan),
        "abs" | "Abs" => unary(f64::abs),
        "log" | "ln" => match values.as_slice() {
            [x] => checked(function, x.ln()),
            [x, base] => {
                let denominator = base.ln();
                if denominator == 0.0 {
                    return Err(FormulaError::DivisionByZero);
                }
                checked(function, x.ln() / denominator)
            }
            _ => Err(FormulaError::Arity {
                name: function.to_string(),
                expected: "1 or 2",
                found: values.len(),
            }),
        },
        _ => Err(FormulaError::UnknownFunction(name.to_string())),
    }
}

/// `integrate(expr, (var, lower, upper))`, composite Simpson's rule.
fn integrate(args: &[Expr], scope: &mut Scope<'_>) -> Result<f64, FormulaError> {
    let [integrand, bounds] = args else {
        return Err(FormulaError::Arity {
            name: "integrate".to_string(),
            expected: "2",
            found: args.len(),
        });
    };
    let Expr::Tuple(bounds) = bounds else {
        return Err(FormulaError::IndefiniteIntegral);
    };
    let [Expr::Symbol(variable), lower, upper] = bounds.as_slice() else {
        return Err(FormulaError::IndefiniteIntegral);
    };

    let lower = evaluate(lower, scope)?;
    let upper = evaluate(upper, scope)?;
    let step = (upper - lower) / SIMPSON_INTERVALS as f64;

    let mut sum = 0.0;
    for index in 0..=SIMPSON_INTERVALS {
        let weight = if index == 0 || index == SIMPSON_INTERVALS {
            1.0
        } else if index % 2 == 1 {
            4.0
        } else {
            2.0
        };
        scope.bound.push((variable.clone(), lower + step * index as f64));
        let value = evaluate(integrand, scope);
        scope.bound.pop();
        sum += weight * value?;
    }

    checked("integrate", sum * step / 3.0)
}

pub(super) fn collect_free_symbols(
    expr: &Expr,
    bound: &mut Vec<String>,
    out: &mut BTreeSet<String>,
) {
    match expr {
        Expr::Number(_) => {}
        Expr::Symbol(name) => {
            if !bound.contains(name) && constant(strip_module(name)).is_none() {
                out.insert(name.clone());
            }
        }
        Expr::Neg(inner) => collect_free_symbols(inner, bound, out),
        Expr::Binary { lhs, rhs, .. } => {
            collect_free_symbols(lhs, bound, out);
            collect_free_symbols(rhs, bound, out);
        }
        Expr::Tuple(items) => {
            for item in items {
                collect_free_symbols(item, bound, out);
            }
        }
        Expr::Call { name, args } => {
            if let (
                "integrate",
                [integrand, Expr::Tuple(bounds)],
            ) = (strip_module(name), args.as_slice())
            {
                if let [Expr::Symbol(variable), lower, upper] = bounds.as_slice() {
                    collect_free_symbols(lower, bound, out);
                    collect_free_symbols(upper, bound, out);
                    bound.push(variable.clone());
                    collect_free_symbols(integrand, bound, out);
                    bound.pop();
                    return;
                }
            }
            for arg in args {
                collect_free_symbols(arg, bound, out);
            }
        }
    }
}
