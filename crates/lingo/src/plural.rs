//! Plural-rule compilation and evaluation.
//!
//! A catalog's `Plural-Forms` header (`nplurals=2; plural=(n != 1);`) is
//! compiled into an expression tree and evaluated by a tree walker. There is
//! no dynamic code generation: catalog content is untrusted translator
//! input, so anything outside the small expression grammar is rejected and
//! the rule degrades to the built-in germanic default.

use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid plural rule: {0}")]
pub struct PluralParseError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Number(u64),
    Var,
    Not,
    Question,
    Colon,
    OpenParen,
    CloseParen,
    Op(BinaryOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn binary_prec(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq | BinaryOp::Ne => 3,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 4,
        BinaryOp::Add | BinaryOp::Sub => 5,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 6,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluralExpr {
    Literal(u64),
    Var,
    Not(Box<PluralExpr>),
    Binary {
        op: BinaryOp,
        left: Box<PluralExpr>,
        right: Box<PluralExpr>,
    },
    Ternary {
        cond: Box<PluralExpr>,
        then: Box<PluralExpr>,
        otherwise: Box<PluralExpr>,
    },
}

impl PluralExpr {
    /// Evaluate the expression for a count.
    ///
    /// Comparisons and logical operators yield 1 or 0; any nonzero value is
    /// truthy. Division or modulo by zero, overflow, and underflow abort
    /// evaluation, so callers re-derive with the default rule instead of
    /// observing a panic.
    pub fn eval(&self, n: u64) -> Option<u64> {
        match self {
            PluralExpr::Literal(value) => Some(*value),
            PluralExpr::Var => Some(n),
            PluralExpr::Not(inner) => Some(u64::from(inner.eval(n)? == 0)),
            PluralExpr::Binary { op, left, right } => {
                let left = left.eval(n)?;
                // Short-circuit so an unevaluated arm cannot fault.
                match op {
                    BinaryOp::Or if left != 0 => return Some(1),
                    BinaryOp::And if left == 0 => return Some(0),
                    _ => {}
                }
                let right = right.eval(n)?;
                let value = match op {
                    BinaryOp::Or | BinaryOp::And => u64::from(right != 0),
                    BinaryOp::Eq => u64::from(left == right),
                    BinaryOp::Ne => u64::from(left != right),
                    BinaryOp::Lt => u64::from(left < right),
                    BinaryOp::Le => u64::from(left <= right),
                    BinaryOp::Gt => u64::from(left > right),
                    BinaryOp::Ge => u64::from(left >= right),
                    BinaryOp::Add => left.checked_add(right)?,
                    BinaryOp::Sub => left.checked_sub(right)?,
                    BinaryOp::Mul => left.checked_mul(right)?,
                    BinaryOp::Div => left.checked_div(right)?,
                    BinaryOp::Rem => left.checked_rem(right)?,
                };
                Some(value)
            }
            PluralExpr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if cond.eval(n)? != 0 {
                    then.eval(n)
                } else {
                    otherwise.eval(n)
                }
            }
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<TokenKind>, PluralParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0usize;

    while index < chars.len() {
        let ch = chars[index];
        if ch.is_whitespace() {
            index += 1;
            continue;
        }
        if ch.is_ascii_digit() {
            let start = index;
            while index < chars.len() && chars[index].is_ascii_digit() {
                index += 1;
            }
            let text: String = chars[start..index].iter().collect();
            let value = text
                .parse::<u64>()
                .map_err(|_| PluralParseError(format!("integer out of range: {text}")))?;
            tokens.push(TokenKind::Number(value));
            continue;
        }
        if ch.is_ascii_alphabetic() {
            let start = index;
            while index < chars.len() && chars[index].is_ascii_alphanumeric() {
                index += 1;
            }
            let text: String = chars[start..index].iter().collect();
            if text != "n" {
                return Err(PluralParseError(format!("unknown identifier: {text}")));
            }
            tokens.push(TokenKind::Var);
            continue;
        }
        let two: String = chars[index..(index + 2).min(chars.len())].iter().collect();
        match two.as_str() {
            "&&" => {
                tokens.push(TokenKind::Op(BinaryOp::And));
                index += 2;
                continue;
            }
            "||" => {
                tokens.push(TokenKind::Op(BinaryOp::Or));
                index += 2;
                continue;
            }
            "==" => {
                tokens.push(TokenKind::Op(BinaryOp::Eq));
                index += 2;
                continue;
            }
            "!=" => {
                tokens.push(TokenKind::Op(BinaryOp::Ne));
                index += 2;
                continue;
            }
            "<=" => {
                tokens.push(TokenKind::Op(BinaryOp::Le));
                index += 2;
                continue;
            }
            ">=" => {
                tokens.push(TokenKind::Op(BinaryOp::Ge));
                index += 2;
                continue;
            }
            _ => {}
        }
        let kind = match ch {
            '!' => TokenKind::Not,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            '<' => TokenKind::Op(BinaryOp::Lt),
            '>' => TokenKind::Op(BinaryOp::Gt),
            '+' => TokenKind::Op(BinaryOp::Add),
            '-' => TokenKind::Op(BinaryOp::Sub),
            '*' => TokenKind::Op(BinaryOp::Mul),
            '/' => TokenKind::Op(BinaryOp::Div),
            '%' => TokenKind::Op(BinaryOp::Rem),
            _ => return Err(PluralParseError(format!("unexpected character: {ch}"))),
        };
        tokens.push(kind);
        index += 1;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<TokenKind>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<TokenKind>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).copied()
    }

    fn error(&self, message: &str) -> PluralParseError {
        PluralParseError(message.to_string())
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<(), PluralParseError> {
        if self.peek() == Some(kind) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn parse_expr(&mut self) -> Result<PluralExpr, PluralParseError> {
        let cond = self.parse_binary(0)?;
        if self.peek() != Some(TokenKind::Question) {
            return Ok(cond);
        }
        self.pos += 1;
        let then = self.parse_expr()?;
        self.expect(TokenKind::Colon, "expected ':' in conditional")?;
        let otherwise = self.parse_expr()?;
        Ok(PluralExpr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<PluralExpr, PluralParseError> {
        let mut left = self.parse_unary()?;
        while let Some(TokenKind::Op(op)) = self.peek() {
            let prec = binary_prec(op);
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let right = self.parse_binary(prec + 1)?;
            left = PluralExpr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<PluralExpr, PluralParseError> {
        if self.peek() == Some(TokenKind::Not) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(PluralExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<PluralExpr, PluralParseError> {
        match self.peek() {
            Some(TokenKind::Number(value)) => {
                self.pos += 1;
                Ok(PluralExpr::Literal(value))
            }
            Some(TokenKind::Var) => {
                self.pos += 1;
                Ok(PluralExpr::Var)
            }
            Some(TokenKind::OpenParen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(TokenKind::CloseParen, "expected ')'")?;
                Ok(inner)
            }
            _ => Err(self.error("expected number, 'n', or '('")),
        }
    }
}

/// Parse a plural expression in isolation.
pub fn parse_expression(text: &str) -> Result<PluralExpr, PluralParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(PluralParseError("empty expression".to_string()));
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(PluralParseError("trailing tokens".to_string()));
    }
    Ok(expr)
}

/// A parsed `Plural-Forms` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluralForms {
    pub nplurals: usize,
    pub expr: PluralExpr,
}

/// Parse a full `Plural-Forms` header value.
///
/// The declaration is a `;`-separated list of `nplurals=INT` and
/// `plural=EXPR` clauses; both must be present.
pub fn parse_plural_forms(header: &str) -> Result<PluralForms, PluralParseError> {
    let mut nplurals = None;
    let mut expr = None;

    for clause in header.split(';') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let Some((name, value)) = clause.split_once('=') else {
            return Err(PluralParseError(format!("expected assignment: {clause}")));
        };
        match name.trim() {
            "nplurals" => {
                let count = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| PluralParseError(format!("invalid nplurals: {value}")))?;
                nplurals = Some(count);
            }
            "plural" => {
                expr = Some(parse_expression(value)?);
            }
            other => {
                return Err(PluralParseError(format!("unknown declaration: {other}")));
            }
        }
    }

    match (nplurals, expr) {
        (Some(nplurals), Some(expr)) => Ok(PluralForms { nplurals, expr }),
        _ => Err(PluralParseError(
            "missing nplurals or plural declaration".to_string(),
        )),
    }
}

/// The rule mapping a count to a plural-form index.
///
/// The default ("germanic") rule selects form 0 for a count of exactly one
/// and form 1 otherwise. A compiled rule comes from a catalog's
/// `Plural-Forms` header; if its evaluation ever faults, the call falls back
/// to the default so an index is always produced.
#[derive(Debug, Clone, Default)]
pub enum PluralRule {
    #[default]
    Germanic,
    Compiled(Arc<PluralForms>),
}

fn germanic_index(n: u64) -> usize {
    usize::from(n != 1)
}

impl PluralRule {
    /// Compile a header value, degrading to the default rule on any error.
    ///
    /// Absent and empty headers are not errors worth reporting; a present
    /// but malformed declaration is logged and then ignored the same way.
    pub fn compile(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return Self::Germanic;
        };
        if header.trim().is_empty() {
            return Self::Germanic;
        }
        match parse_plural_forms(header) {
            Ok(forms) => Self::Compiled(Arc::new(forms)),
            Err(err) => {
                tracing::debug!(header, %err, "plural rule rejected, using default");
                Self::Germanic
            }
        }
    }

    /// Plural-form index for a count. Total: never panics, never fails.
    pub fn index(&self, n: u64) -> usize {
        match self {
            Self::Germanic => germanic_index(n),
            Self::Compiled(forms) => match forms.expr.eval(n) {
                Some(value) => value as usize,
                None => germanic_index(n),
            },
        }
    }

    /// Declared number of plural forms (2 for the default rule).
    pub fn nplurals(&self) -> usize {
        match self {
            Self::Germanic => 2,
            Self::Compiled(forms) => forms.nplurals,
        }
    }
}
