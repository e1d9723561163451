use super::lexer::{Spanned, Token};
use super::FormulaError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Expr {
    Number(f64),
    Symbol(String),
    Neg(Box<Expr>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { name: String, args: Vec<Expr> },
    Tuple(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Parses the full token stream into the list of output expressions.
///
/// Grammar, loosest binding first:
///
/// ```text
/// formula := expr (',' expr)* ','?
/// expr    := term (('+' | '-') term)*
/// term    := unary (('*' | '/') unary)*
/// unary   := ('-' | '+') unary | power
/// power   := atom ('**' unary)?
/// atom    := NUMBER | IDENT | IDENT '(' list ')' | '(' list ')'
/// ```
pub(super) fn parse(tokens: &[Spanned]) -> Result<Vec<Expr>, FormulaError> {
    let mut parser = Parser { tokens, cursor: 0 };
    let items = parser.list(None)?;
    if let Some((position, token)) = parser.tokens.get(parser.cursor) {
        return Err(FormulaError::UnexpectedToken { found: token.to_string(), position: *position });
    }

    // `(a, b)` at the top level is the same as `a, b`.
    let outputs = match items.as_slice() {
        [Expr::Tuple(inner)] => inner.clone(),
        _ => items,
    };
    for output in &outputs {
        reject_nested_tuples(output)?;
    }
    Ok(outputs)
}

fn reject_nested_tuples(expr: &Expr) -> Result<(), FormulaError> {
    match expr {
        Expr::Number(_) | Expr::Symbol(_) => Ok(()),
        Expr::Tuple(_) => Err(FormulaError::NestedTuple),
        Expr::Neg(inner) => reject_nested_tuples(inner),
        Expr::Binary { lhs, rhs, .. } => {
            reject_nested_tuples(lhs)?;
            reject_nested_tuples(rhs)
        }
        Expr::Call { args, .. } => {
            for arg in args {
                match arg {
                    // Call arguments may be tuples (integration bounds) whose
                    // elements must themselves be scalars.
                    Expr::Tuple(items) => {
                        for item in items {
                            reject_nested_tuples(item)?;
                        }
                    }
                    other => reject_nested_tuples(other)?,
                }
            }
            Ok(())
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    cursor: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, token)| token)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.cursor).map(|(_, token)| token);
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        match self.tokens.get(self.cursor) {
            Some((_, token)) if *token == expected => {
                self.cursor += 1;
                Ok(())
            }
            Some((position, token)) => {
                Err(FormulaError::UnexpectedToken { found: token.to_string(), position: *position })
            }
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    /// Comma-separated expressions, stopping before `terminator` (or the end
    /// of input when `terminator` is `None`). A trailing comma is allowed.
    fn list(&mut self, terminator: Option<Token>) -> Result<Vec<Expr>, FormulaError> {
        let mut items = vec![self.expr()?];
        while self.peek() == Some(&Token::Comma) {
            self.cursor += 1;
            let closed = match (self.peek(), &terminator) {
                (None, None) => true,
                (Some(token), Some(end)) => token == end,
                _ => false,
            };
            if closed {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(items)
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.cursor += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.cursor += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.cursor += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.cursor += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Power) {
            self.cursor += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        let position = self.tokens.get(self.cursor).map(|(position, _)| *position);
        match self.advance().cloned() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Symbol(name));
                }
                self.cursor += 1;
                let args = if self.peek() == Some(&Token::RParen) {
                    Vec::new()
                } else {
                    self.list(Some(Token::RParen))?
                };
                self.expect(Token::RParen)?;
                Ok(Expr::Call { name, args })
            }
            Some(Token::LParen) => {
                let mut items = self.list(Some(Token::RParen))?;
                self.expect(Token::RParen)?;
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Ok(Expr::Tuple(items))
                }
            }
            Some(token) => Err(FormulaError::UnexpectedToken {
                found: token.to_string(),
                position: position.unwrap_or_default(),
            }),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}
