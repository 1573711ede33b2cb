//! Boolean row filters over manifest columns.
//!
//! The language is a small subset of the pandas `query` syntax:
//! - `age > 30`, `site == 'gut'`, `site != "skin"`
//! - `site in ['gut', 'oral']`, `site not in ['skin']`
//! - `a and b`, `a or b`, `not a` (also `&`, `|`, `~`)
//! - backticks for column names that are not plain identifiers: `` `body site` == 'gut' ``
//! - `True` and `False` literals: `flag == True`
//!
//! A column whose present values all parse as numbers holds numbers;
//! any other column holds text. Numbers only equal numbers and quoted
//! strings only equal text, so `batch == '1'` never matches a numeric
//! column. A boolean literal equals `1`/`0` and the text `True`/`False`
//! (any case). `True` and `False` are case sensitive; `true` is a column
//! name. A missing cell never satisfies a comparison, except for `!=` and
//! `not in`.

use crate::data::{Manifest, Variable};
use crate::error::{AlignError, Result};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        };
        write!(f, "{}", s)
    }
}

/// Leaf of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A manifest column (or the identifier column).
    Column(String),
    /// A quoted string.
    Text(String),
    /// An unquoted number.
    Number(f64),
    /// `True` or `False`.
    Bool(bool),
    /// A bracketed list, only valid on the right of a membership test.
    List(Vec<Operand>),
}

/// Parsed filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    /// A bare operand used as a predicate.
    Truthy(Operand),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Cmp(CmpOp),
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn parse_error(msg: impl Into<String>) -> AlignError {
    AlignError::FilterParse(msg.into())
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '&' => {
                tokens.push(Token::And);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Or);
                i += 1;
            }
            '~' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CmpOp::Eq, 2),
                    ('!', Some('=')) => (CmpOp::Ne, 2),
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', _) => (CmpOp::Gt, 1),
                    _ => return Err(parse_error(format!("Unexpected '{}' at position {}", c, i))),
                };
                tokens.push(Token::Cmp(op));
                i += width;
            }
            '\'' | '"' | '`' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(parse_error(format!("Unterminated {} quote", quote))),
                        Some('\\') if quote != '`' => {
                            if let Some(&escaped) = chars.get(i + 1) {
                                text.push(escaped);
                            }
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(if quote == '`' {
                    Token::Ident(text)
                } else {
                    Token::Str(text)
                });
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '.') && next.map_or(false, |n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while let Some(&ch) = chars.get(i) {
                    let exponent_sign =
                        (ch == '-' || ch == '+') && matches!(chars[i - 1], 'e' | 'E');
                    if ch.is_ascii_alphanumeric() || ch == '.' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| parse_error(format!("Invalid number '{}'", text)))?;
                tokens.push(Token::Num(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while let Some(&ch) = chars.get(i) {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "True" => Token::Bool(true),
                    "False" => Token::Bool(false),
                    _ => Token::Ident(word),
                });
            }
            _ => return Err(parse_error(format!("Unexpected '{}' at position {}", c, i))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.advance() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(parse_error(format!("Expected {:?}, found {:?}", expected, t))),
            None => Err(parse_error(format!("Expected {:?} at end of expression", expected))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        let left = self.parse_operand()?;
        let op = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Cmp(op)), _) => Some((*op, 1)),
            (Some(Token::In), _) => Some((CmpOp::In, 1)),
            (Some(Token::Not), Some(Token::In)) => Some((CmpOp::NotIn, 2)),
            _ => None,
        };
        let Some((op, width)) = op else {
            if matches!(left, Operand::List(_)) {
                return Err(parse_error("A list cannot be used as a condition"));
            }
            return Ok(Expr::Truthy(left));
        };
        self.pos += width;
        let right = self.parse_operand()?;

        if matches!(left, Operand::List(_)) {
            return Err(parse_error("A list must be on the right of a comparison"));
        }
        // `col == [..]` is a membership test, as in pandas
        let op = match (op, &right) {
            (CmpOp::Eq, Operand::List(_)) => CmpOp::In,
            (CmpOp::Ne, Operand::List(_)) => CmpOp::NotIn,
            (CmpOp::Eq | CmpOp::Ne | CmpOp::In | CmpOp::NotIn, _) => op,
            (_, Operand::List(_)) => {
                return Err(parse_error(format!("Operator '{}' cannot take a list", op)))
            }
            _ => op,
        };

        Ok(Expr::Compare { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(Operand::Column(name)),
            Some(Token::Str(text)) => Ok(Operand::Text(text)),
            Some(Token::Num(number)) => Ok(Operand::Number(number)),
            Some(Token::Bool(flag)) => Ok(Operand::Bool(flag)),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.advance();
                    return Ok(Operand::List(items));
                }
                loop {
                    let item = self.parse_operand()?;
                    if matches!(item, Operand::List(_)) {
                        return Err(parse_error("Lists cannot be nested"));
                    }
                    items.push(item);
                    match self.advance() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        other => {
                            return Err(parse_error(format!(
                                "Expected ',' or ']' in list, found {:?}",
                                other
                            )))
                        }
                    }
                }
                Ok(Operand::List(items))
            }
            Some(t) => Err(parse_error(format!("Expected a value, found {:?}", t))),
            None => Err(parse_error("Unexpected end of expression")),
        }
    }
}

/// A parsed filter, keeping its source text for messages.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    source: String,
    expr: Expr,
}

impl FilterExpr {
    /// Parse a filter expression.
    ///
    /// # Examples
    /// ```
    /// use specimen_align::design::FilterExpr;
    /// let f = FilterExpr::parse("site in ['gut', 'oral'] and age >= 18").unwrap();
    /// assert_eq!(f.columns(), vec!["site", "age"]);
    /// ```
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(parse_error("Filter expression is empty"));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(t) = parser.peek() {
            return Err(parse_error(format!("Unexpected {:?} after expression", t)));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The expression as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed tree.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Column names referenced, in order of first use.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_columns(&self.expr, &mut out);
        out
    }

    /// Evaluate against every manifest row.
    ///
    /// Names may refer to metadata columns or to the identifier column.
    pub fn evaluate(&self, manifest: &Manifest) -> Result<Vec<bool>> {
        let mut numeric = HashSet::new();
        for name in self.columns() {
            if manifest.has_column(name) {
                if is_numeric_column(&manifest.column(name)?) {
                    numeric.insert(name);
                }
            } else if name != manifest.id_column() {
                return Err(AlignError::MissingColumn(name.to_string()));
            }
        }
        Ok((0..manifest.n_samples())
            .map(|row| {
                let ctx = RowContext {
                    manifest,
                    numeric: &numeric,
                    row,
                };
                ctx.eval(&self.expr)
            })
            .collect())
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn push_column<'a>(operand: &'a Operand, out: &mut Vec<&'a str>) {
    if let Operand::Column(name) = operand {
        if !out.contains(&name.as_str()) {
            out.push(name.as_str());
        }
    }
}

fn collect_columns<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Or(a, b) | Expr::And(a, b) => {
            collect_columns(a, out);
            collect_columns(b, out);
        }
        Expr::Not(inner) => collect_columns(inner, out),
        Expr::Compare { left, right, .. } => {
            push_column(left, out);
            match right {
                Operand::List(items) => items.iter().for_each(|item| push_column(item, out)),
                other => push_column(other, out),
            }
        }
        Expr::Truthy(operand) => push_column(operand, out),
    }
}

fn is_numeric_column(values: &[&Variable]) -> bool {
    let mut present = values.iter().filter(|v| !v.is_missing()).peekable();
    present.peek().is_some() && present.all(|v| v.as_number().is_some())
}

/// A resolved operand for one row.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Text(text) => !text.is_empty(),
            Value::Number(n) => *n != 0.0,
            Value::Bool(flag) => *flag,
        }
    }
}

struct RowContext<'a> {
    manifest: &'a Manifest,
    numeric: &'a HashSet<&'a str>,
    row: usize,
}

impl RowContext<'_> {
    /// Value of an operand for this row; `None` when missing.
    fn scalar(&self, operand: &Operand) -> Option<Value> {
        match operand {
            Operand::Text(text) => Some(Value::Text(text.clone())),
            Operand::Number(n) => Some(Value::Number(*n)),
            Operand::Bool(flag) => Some(Value::Bool(*flag)),
            Operand::Column(name) => match self.manifest.column_index(name) {
                Some(col) => {
                    let cell = &self.manifest.row(self.row)[col];
                    if cell.is_missing() {
                        None
                    } else if self.numeric.contains(name.as_str()) {
                        cell.as_number().map(Value::Number)
                    } else {
                        Some(Value::Text(cell.render()))
                    }
                }
                None => Some(Value::Text(self.manifest.sample_ids()[self.row].clone())),
            },
            Operand::List(_) => None,
        }
    }

    fn eval(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Or(a, b) => self.eval(a) || self.eval(b),
            Expr::And(a, b) => self.eval(a) && self.eval(b),
            Expr::Not(inner) => !self.eval(inner),
            Expr::Truthy(operand) => self.scalar(operand).map_or(false, |v| v.truthy()),
            Expr::Compare { left, op, right } => self.compare(left, *op, right),
        }
    }

    fn compare(&self, left: &Operand, op: CmpOp, right: &Operand) -> bool {
        let Some(lhs) = self.scalar(left) else {
            return matches!(op, CmpOp::Ne | CmpOp::NotIn);
        };

        match op {
            CmpOp::In | CmpOp::NotIn => {
                let found = match right {
                    Operand::List(items) => items
                        .iter()
                        .filter_map(|item| self.scalar(item))
                        .any(|rhs| compare_values(&lhs, &rhs) == Some(Ordering::Equal)),
                    single => self
                        .scalar(single)
                        .map_or(false, |rhs| compare_values(&lhs, &rhs) == Some(Ordering::Equal)),
                };
                found == (op == CmpOp::In)
            }
            _ => {
                let Some(rhs) = self.scalar(right) else {
                    return op == CmpOp::Ne;
                };
                match compare_values(&lhs, &rhs) {
                    Some(ord) => match op {
                        CmpOp::Eq => ord == Ordering::Equal,
                        CmpOp::Ne => ord != Ordering::Equal,
                        CmpOp::Lt => ord == Ordering::Less,
                        CmpOp::Le => ord != Ordering::Greater,
                        CmpOp::Gt => ord == Ordering::Greater,
                        CmpOp::Ge => ord != Ordering::Less,
                        CmpOp::In | CmpOp::NotIn => false,
                    },
                    // NaN, or values of different kinds
                    None => op == CmpOp::Ne,
                }
            }
        }
    }
}

fn text_as_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Ordering of two values of compatible kinds; `None` when they cannot be
/// compared.
fn compare_values(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Bool(flag), Value::Number(n)) => f64::from(u8::from(*flag)).partial_cmp(n),
        (Value::Number(n), Value::Bool(flag)) => n.partial_cmp(&f64::from(u8::from(*flag))),
        (Value::Bool(flag), Value::Text(text)) => text_as_bool(text).map(|b| flag.cmp(&b)),
        (Value::Text(text), Value::Bool(flag)) => text_as_bool(text).map(|b| b.cmp(flag)),
        (Value::Number(_), Value::Text(_)) | (Value::Text(_), Value::Number(_)) => None,
    }
}
