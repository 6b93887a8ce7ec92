//! Restricted arithmetic mini-language for formula scores.
//!
//! Grammar (closed; anything else is a parse error):
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := NUMBER | IDENT | '(' expr ')' | '-' factor
//! NUMBER := [0-9]+ ('.' [0-9]+)?
//! IDENT  := [A-Za-z_][A-Za-z0-9_]*
//! ```
//!
//! Expressions are parsed once at recipe load into an explicit tree and
//! evaluated per row against a name-to-value environment. There is no
//! dynamic code execution and no function call syntax.

use std::collections::BTreeSet;

/// Parse failure; fatal at recipe load time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaParseError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { offset: usize, ch: char },
    #[error("unexpected '{found}' at offset {offset}")]
    UnexpectedToken { offset: usize, found: String },
    #[error("formula ended unexpectedly")]
    UnexpectedEnd,
    #[error("formula is empty")]
    Empty,
}

/// Per-row evaluation failure; recorded as a row diagnostic, never fatal
/// for the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaEvalError {
    #[error("reference '{0}' has no value in this row")]
    UndefinedReference(String),
    #[error("division by zero")]
    DivisionByZero,
}

/// Name-to-value environment a formula evaluates against.
pub trait FormulaEnv {
    fn value_of(&self, name: &str) -> Option<f64>;
}

impl FormulaEnv for std::collections::BTreeMap<String, f64> {
    fn value_of(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Explicit expression tree produced by [`parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    Literal(f64),
    Reference(String),
    Negate(Box<FormulaExpr>),
    Binary {
        op: BinaryOp,
        lhs: Box<FormulaExpr>,
        rhs: Box<FormulaExpr>,
    },
}

impl FormulaExpr {
    /// Referenced names, deduplicated, in first-appearance order.
    pub fn references(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut references = Vec::new();
        self.collect_references(&mut seen, &mut references);
        references
    }

    fn collect_references(&self, seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
        match self {
            FormulaExpr::Literal(_) => {}
            FormulaExpr::Reference(name) => {
                if seen.insert(name.clone()) {
                    out.push(name.clone());
                }
            }
            FormulaExpr::Negate(inner) => inner.collect_references(seen, out),
            FormulaExpr::Binary { lhs, rhs, .. } => {
                lhs.collect_references(seen, out);
                rhs.collect_references(seen, out);
            }
        }
    }

    pub fn evaluate<E: FormulaEnv + ?Sized>(&self, env: &E) -> Result<f64, FormulaEvalError> {
        match self {
            FormulaExpr::Literal(value) => Ok(*value),
            FormulaExpr::Reference(name) => env
                .value_of(name)
                .ok_or_else(|| FormulaEvalError::UndefinedReference(name.clone())),
            FormulaExpr::Negate(inner) => Ok(-inner.evaluate(env)?),
            FormulaExpr::Binary { op, lhs, rhs } => {
                let left = lhs.evaluate(env)?;
                let right = rhs.evaluate(env)?;
                match op {
                    BinaryOp::Add => Ok(left + right),
                    BinaryOp::Sub => Ok(left - right),
                    BinaryOp::Mul => Ok(left * right),
                    BinaryOp::Div => {
                        if right == 0.0 {
                            Err(FormulaEvalError::DivisionByZero)
                        } else {
                            Ok(left / right)
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    OpenParen,
    CloseParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(value) => value.to_string(),
            Token::Ident(name) => name.clone(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::OpenParen => "(".to_string(),
            Token::CloseParen => ")".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, FormulaParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {}
            '+' => tokens.push((offset, Token::Plus)),
            '-' => tokens.push((offset, Token::Minus)),
            '*' => tokens.push((offset, Token::Star)),
            '/' => tokens.push((offset, Token::Slash)),
            '(' => tokens.push((offset, Token::OpenParen)),
            ')' => tokens.push((offset, Token::CloseParen)),
            '0'..='9' => {
                // Digit runs are ASCII, so the end offset advances by one
                // byte per consumed character.
                let mut end = offset + 1;
                while let Some(&(next, digit)) = chars.peek() {
                    if !digit.is_ascii_digit() {
                        break;
                    }
                    chars.next();
                    end = next + 1;
                }
                if let Some(&(dot, '.')) = chars.peek() {
                    chars.next();
                    match chars.peek() {
                        Some(&(next, digit)) if digit.is_ascii_digit() => {
                            chars.next();
                            end = next + 1;
                            while let Some(&(next, digit)) = chars.peek() {
                                if !digit.is_ascii_digit() {
                                    break;
                                }
                                chars.next();
                                end = next + 1;
                            }
                        }
                        Some(&(next, other)) => {
                            return Err(FormulaParseError::UnexpectedChar {
                                offset: next,
                                ch: other,
                            });
                        }
                        None => {
                            return Err(FormulaParseError::UnexpectedChar {
                                offset: dot,
                                ch: '.',
                            });
                        }
                    }
                }
                let literal = &input[offset..end];
                let value = literal.parse::<f64>().map_err(|_| {
                    FormulaParseError::UnexpectedToken {
                        offset,
                        found: literal.to_string(),
                    }
                })?;
                tokens.push((offset, Token::Number(value)));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut end = offset + 1;
                while let Some(&(next, part)) = chars.peek() {
                    if !(part.is_ascii_alphanumeric() || part == '_') {
                        break;
                    }
                    chars.next();
                    end = next + 1;
                }
                tokens.push((offset, Token::Ident(input[offset..end].to_string())));
            }
            other => {
                return Err(FormulaParseError::UnexpectedChar { offset, ch: other });
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&(usize, Token)> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<FormulaExpr, FormulaParseError> {
        let mut lhs = self.term()?;
        while let Some((_, token)) = self.peek() {
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            lhs = FormulaExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<FormulaExpr, FormulaParseError> {
        let mut lhs = self.factor()?;
        while let Some((_, token)) = self.peek() {
            let op = match token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.factor()?;
            lhs = FormulaExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<FormulaExpr, FormulaParseError> {
        match self.advance() {
            Some((_, Token::Number(value))) => Ok(FormulaExpr::Literal(value)),
            Some((_, Token::Ident(name))) => Ok(FormulaExpr::Reference(name)),
            Some((_, Token::Minus)) => {
                Ok(FormulaExpr::Negate(Box::new(self.factor()?)))
            }
            Some((_, Token::OpenParen)) => {
                let inner = self.expr()?;
                match self.advance() {
                    Some((_, Token::CloseParen)) => Ok(inner),
                    Some((offset, token)) => Err(FormulaParseError::UnexpectedToken {
                        offset,
                        found: token.describe(),
                    }),
                    None => Err(FormulaParseError::UnexpectedEnd),
                }
            }
            Some((offset, token)) => Err(FormulaParseError::UnexpectedToken {
                offset,
                found: token.describe(),
            }),
            None => Err(FormulaParseError::UnexpectedEnd),
        }
    }
}

/// Parses a formula to its expression tree.
pub fn parse(input: &str) -> Result<FormulaExpr, FormulaParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FormulaParseError::Empty);
    }
    let mut parser = Parser { tokens, position: 0 };
    let expr = parser.expr()?;
    if let Some((offset, token)) = parser.peek() {
        return Err(FormulaParseError::UnexpectedToken {
            offset: *offset,
            found: token.describe(),
        });
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn respects_operator_precedence() {
        let expr = parse("1 + 2 * 3").expect("parses");
        assert_eq!(expr.evaluate(&env(&[])).expect("evaluates"), 7.0);
    }

    #[test]
    fn parentheses_override_precedence() {
        let expr = parse("(1 + 2) * 3").expect("parses");
        assert_eq!(expr.evaluate(&env(&[])).expect("evaluates"), 9.0);
    }

    #[test]
    fn unary_minus_binds_to_factor() {
        let expr = parse("-a * 2").expect("parses");
        assert_eq!(expr.evaluate(&env(&[("a", 3.0)])).expect("evaluates"), -6.0);
    }

    #[test]
    fn division_by_zero_is_an_eval_error() {
        let expr = parse("a / b").expect("parses");
        let err = expr
            .evaluate(&env(&[("a", 1.0), ("b", 0.0)]))
            .expect_err("division by zero");
        assert_eq!(err, FormulaEvalError::DivisionByZero);
    }

    #[test]
    fn undefined_references_are_eval_errors() {
        let expr = parse("weight / height").expect("parses");
        let err = expr
            .evaluate(&env(&[("weight", 70.0)]))
            .expect_err("height is undefined");
        assert_eq!(
            err,
            FormulaEvalError::UndefinedReference("height".to_string())
        );
    }

    #[test]
    fn collects_references_in_first_appearance_order() {
        let expr = parse("(b + a) / (b - 1)").expect("parses");
        assert_eq!(expr.references(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn rejects_syntax_outside_the_grammar() {
        assert!(parse("a ** b").is_err());
        assert!(parse("max(a, b)").is_err());
        assert!(parse("a > b").is_err());
        assert!(parse("1 +").is_err());
        assert!(parse("").is_err());
        assert!(parse("(a + b").is_err());
    }

    #[test]
    fn reports_the_actual_non_ascii_character() {
        let err = parse("a + é").expect_err("non-ascii rejected");
        assert_eq!(
            err,
            FormulaParseError::UnexpectedChar { offset: 4, ch: 'é' }
        );
    }

    #[test]
    fn parses_decimal_literals() {
        let expr = parse("0.5 * a").expect("parses");
        assert_eq!(expr.evaluate(&env(&[("a", 4.0)])).expect("evaluates"), 2.0);
    }
}
