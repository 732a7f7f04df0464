//! Sandboxed arithmetic evaluation.
//!
//! Expressions are parsed into a full syntax tree first, including the node
//! kinds that are never allowed to run (names, calls, attribute access,
//! comparisons and string literals). [`validate`] walks every node and
//! rejects the tree if anything outside plain numeric arithmetic is present.
//! Only a validated tree reaches [`eval`].
//!
//! Numbers follow the usual dynamic-language rules: integer arithmetic stays
//! integral, `/` always produces a float and `%` takes the sign of the
//! divisor.
//!
//! Input length and nesting depth are bounded before any recursion happens,
//! so the tree walkers never run deeper than [`MAX_DEPTH`] plus the
//! operator count allowed by [`MAX_EXPRESSION_LEN`].

use std::fmt;

use thiserror::Error;

/// Reply text for expressions rejected by validation.
pub const UNSAFE_EXPRESSION: &str = "Invalid or unsafe expression.";

/// Longest expression accepted, in characters.
pub const MAX_EXPRESSION_LEN: usize = 1024;

/// Deepest nesting of parentheses, unary operators and exponents.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalcError {
    #[error("invalid syntax: {0}")]
    Syntax(String),

    #[error("unsafe expression")]
    Unsafe,

    #[error("{0}")]
    ZeroDivision(&'static str),

    #[error("integer overflow")]
    Overflow,

    #[error("numerical result out of range")]
    OutOfRange,

    #[error("math domain error")]
    Domain,
}

/// Evaluate `expr` and format the reply shown to the user.
pub fn calculate(expr: &str) -> String {
    match evaluate(expr) {
        Ok(value) => format!("Result: {value}"),
        Err(CalcError::Unsafe) => UNSAFE_EXPRESSION.to_string(),
        Err(e) => format!("Error evaluating expression: {e}"),
    }
}

/// Parse, validate and evaluate an expression.
pub fn evaluate(expr: &str) -> Result<Number, CalcError> {
    let tree = parse(expr)?;
    validate(&tree)?;
    eval(&tree)
}

// =============================================================================
// Values
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(v) => f.write_str(&format_float(*v)),
        }
    }
}

/// Shortest round-trip representation, always showing a decimal point or an
/// exponent so floats stay distinguishable from integers.
fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let abs = v.abs();
    if abs >= 1e16 || (abs != 0.0 && abs < 1e-4) {
        let sci = format!("{v:e}");
        let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
        let (sign, digits) = match exponent.strip_prefix('-') {
            Some(digits) => ('-', digits),
            None => ('+', exponent),
        };
        return format!("{mantissa}e{sign}{digits:0>2}");
    }

    let plain = format!("{v}");
    if plain.contains('.') {
        plain
    } else {
        format!("{plain}.0")
    }
}

// =============================================================================
// Syntax tree
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Num(Number),
    Str(String),
    Name(String),
    Unary(UnaryOp, Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Compare(Box<Node>, Vec<(String, Node)>),
    Call(Box<Node>, Vec<Node>),
    Attribute(Box<Node>, String),
}

/// Reject any node outside numeric literals, arithmetic operators, unary
/// sign and grouping.
fn validate(node: &Node) -> Result<(), CalcError> {
    match node {
        Node::Num(_) => Ok(()),
        Node::Unary(UnaryOp::Plus | UnaryOp::Minus, operand) => validate(operand),
        Node::Binary(op, lhs, rhs) if *op != BinOp::FloorDiv => {
            validate(lhs)?;
            validate(rhs)
        }
        _ => Err(CalcError::Unsafe),
    }
}

fn eval(node: &Node) -> Result<Number, CalcError> {
    match node {
        Node::Num(n) => Ok(*n),
        Node::Unary(op, operand) => {
            let value = eval(operand)?;
            match (op, value) {
                (UnaryOp::Plus, v) => Ok(v),
                (UnaryOp::Minus, Number::Int(i)) => {
                    i.checked_neg().map(Number::Int).ok_or(CalcError::Overflow)
                }
                (UnaryOp::Minus, Number::Float(f)) => Ok(Number::Float(-f)),
                (UnaryOp::Not, _) => Err(CalcError::Unsafe),
            }
        }
        Node::Binary(op, lhs, rhs) => apply(*op, eval(lhs)?, eval(rhs)?),
        _ => Err(CalcError::Unsafe),
    }
}

fn apply(op: BinOp, lhs: Number, rhs: Number) -> Result<Number, CalcError> {
    use Number::{Float, Int};

    match op {
        BinOp::Add => match (lhs, rhs) {
            (Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or(CalcError::Overflow),
            (a, b) => Ok(Float(a.as_f64() + b.as_f64())),
        },
        BinOp::Sub => match (lhs, rhs) {
            (Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or(CalcError::Overflow),
            (a, b) => Ok(Float(a.as_f64() - b.as_f64())),
        },
        BinOp::Mul => match (lhs, rhs) {
            (Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or(CalcError::Overflow),
            (a, b) => Ok(Float(a.as_f64() * b.as_f64())),
        },
        BinOp::Div => {
            if rhs.is_zero() {
                return Err(CalcError::ZeroDivision("division by zero"));
            }
            Ok(Float(lhs.as_f64() / rhs.as_f64()))
        }
        BinOp::Mod => match (lhs, rhs) {
            (Int(_), Int(0)) => Err(CalcError::ZeroDivision("integer modulo by zero")),
            (Int(a), Int(b)) => {
                let r = a.checked_rem(b).ok_or(CalcError::Overflow)?;
                Ok(Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
            }
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                if b == 0.0 {
                    return Err(CalcError::ZeroDivision("float modulo"));
                }
                let r = a % b;
                Ok(Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
            }
        },
        BinOp::Pow => match (lhs, rhs) {
            (Int(a), Int(b)) if b >= 0 => {
                let exp = u32::try_from(b).map_err(|_| CalcError::Overflow)?;
                a.checked_pow(exp).map(Int).ok_or(CalcError::Overflow)
            }
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                if a == 0.0 && b < 0.0 {
                    return Err(CalcError::ZeroDivision(
                        "0.0 cannot be raised to a negative power",
                    ));
                }
                let result = a.powf(b);
                if result.is_nan() {
                    return Err(CalcError::Domain);
                }
                if result.is_infinite() && a.is_finite() && b.is_finite() {
                    return Err(CalcError::OutOfRange);
                }
                Ok(Float(result))
            }
        },
        BinOp::FloorDiv => Err(CalcError::Unsafe),
    }
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Number),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
    Dot,
}

const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">",
];

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    if input.chars().nth(MAX_EXPRESSION_LEN).is_some() {
        return Err(CalcError::Syntax("expression too long".to_string()));
    }
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            let (number, next) = lex_number(&chars, i)?;
            tokens.push(Token::Num(number));
            i = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        if c == '\'' || c == '"' {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|&ch| ch == c)
                .map(|p| start + p)
                .ok_or_else(|| CalcError::Syntax("unterminated string literal".to_string()))?;
            tokens.push(Token::Str(chars[start..end].iter().collect()));
            i = end + 1;
            continue;
        }

        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            '.' => tokens.push(Token::Dot),
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let op = OPERATORS
                    .iter()
                    .copied()
                    .find(|op| rest.starts_with(*op))
                    .ok_or_else(|| CalcError::Syntax(format!("unexpected character '{c}'")))?;
                tokens.push(Token::Op(op));
                i += op.len();
                continue;
            }
        }
        i += 1;
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> Result<(Number, usize), CalcError> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let literal: String = chars[start..i].iter().collect();
    let number = if is_float {
        literal
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| CalcError::Syntax(format!("invalid number '{literal}'")))?
    } else {
        literal.parse::<i64>().map(Number::Int).map_err(|_| CalcError::Overflow)?
    };
    Ok((number, i))
}

// =============================================================================
// Parser
// =============================================================================

fn parse(input: &str) -> Result<Node, CalcError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(CalcError::Syntax("empty expression".to_string()));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let node = parser.expression()?;
    match parser.peek() {
        None => Ok(node),
        Some(token) => Err(CalcError::Syntax(format!("unexpected token {token:?}"))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_op(&mut self, candidates: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if candidates.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    /// Run `rule` one nesting level deeper, failing past [`MAX_DEPTH`].
    fn nested(
        &mut self,
        rule: fn(&mut Self) -> Result<Node, CalcError>,
    ) -> Result<Node, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::Syntax("expression too deeply nested".to_string()));
        }
        self.depth += 1;
        let node = rule(self);
        self.depth -= 1;
        node
    }

    fn expression(&mut self) -> Result<Node, CalcError> {
        self.nested(Self::comparison)
    }

    fn comparison(&mut self) -> Result<Node, CalcError> {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == "not") {
            self.pos += 1;
            let operand = self.expression()?;
            return Ok(Node::Unary(UnaryOp::Not, Box::new(operand)));
        }

        let left = self.arith()?;
        let mut comparisons = Vec::new();
        while let Some(op) = self.eat_op(&["==", "!=", "<=", ">=", "<", ">"]) {
            comparisons.push((op.to_string(), self.arith()?));
        }

        if comparisons.is_empty() {
            Ok(left)
        } else {
            Ok(Node::Compare(Box::new(left), comparisons))
        }
    }

    fn arith(&mut self) -> Result<Node, CalcError> {
        let mut node = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.term()?;
            let op = if op == "+" { BinOp::Add } else { BinOp::Sub };
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Node, CalcError> {
        let mut node = self.factor()?;
        while let Some(op) = self.eat_op(&["*", "/", "//", "%"]) {
            let rhs = self.factor()?;
            let op = match op {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                "//" => BinOp::FloorDiv,
                _ => BinOp::Mod,
            };
            node = Node::Binary(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn factor(&mut self) -> Result<Node, CalcError> {
        if let Some(op) = self.eat_op(&["+", "-"]) {
            let operand = self.nested(Self::factor)?;
            let op = if op == "+" { UnaryOp::Plus } else { UnaryOp::Minus };
            return Ok(Node::Unary(op, Box::new(operand)));
        }
        self.power()
    }

    /// `**` binds tighter than unary minus on its left and is right associative.
    fn power(&mut self) -> Result<Node, CalcError> {
        let base = self.postfix()?;
        if self.eat_op(&["**"]).is_some() {
            let exponent = self.nested(Self::factor)?;
            return Ok(Node::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Node, CalcError> {
        let mut node = self.atom()?;
        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    self.pos += 1;
                    let args = self.arguments()?;
                    node = Node::Call(Box::new(node), args);
                }
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(attr)) => node = Node::Attribute(Box::new(node), attr),
                        other => {
                            return Err(CalcError::Syntax(format!(
                                "expected attribute name, found {other:?}"
                            )));
                        }
                    }
                }
                _ => return Ok(node),
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Node>, CalcError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => {
                    return Err(CalcError::Syntax(format!("expected ')', found {other:?}")));
                }
            }
        }
    }

    fn atom(&mut self) -> Result<Node, CalcError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Node::Num(n)),
            Some(Token::Str(s)) => Ok(Node::Str(s)),
            Some(Token::Ident(name)) => Ok(Node::Name(name)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    other => Err(CalcError::Syntax(format!("expected ')', found {other:?}"))),
                }
            }
            Some(token) => Err(CalcError::Syntax(format!("unexpected token {token:?}"))),
            None => Err(CalcError::Syntax("unexpected end of expression".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(calculate("2+2"), "Result: 4");
        assert_eq!(calculate("2 * (3 + 4)"), "Result: 14");
        assert_eq!(calculate("10 - 2 - 3"), "Result: 5");
        assert_eq!(calculate("-3 + +5"), "Result: 2");
    }

    #[test]
    fn test_division_is_float() {
        assert_eq!(calculate("10/4"), "Result: 2.5");
        assert_eq!(calculate("8/2"), "Result: 4.0");
        assert_eq!(calculate("0.1+0.2"), "Result: 0.30000000000000004");
    }

    #[test]
    fn test_power_and_modulo() {
        assert_eq!(calculate("2**10"), "Result: 1024");
        assert_eq!(calculate("2**3**2"), "Result: 512");
        assert_eq!(calculate("-2**2"), "Result: -4");
        assert_eq!(calculate("2**-1"), "Result: 0.5");
        assert_eq!(calculate("7 % 3"), "Result: 1");
        assert_eq!(calculate("-7 % 3"), "Result: 2");
        assert_eq!(calculate("7 % -3"), "Result: -2");
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(3.0), "3.0");
    }

    #[test]
    fn test_rejects_unsafe_nodes() {
        for expr in [
            "__import__('os')",
            "__import__('os').system('ls')",
            "x",
            "abs(-1)",
            "(1).real",
            "1 < 2",
            "'a'",
            "not 1",
            "7 // 2",
        ] {
            assert_eq!(calculate(expr), UNSAFE_EXPRESSION, "expr: {expr}");
        }
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            calculate("1/0"),
            "Error evaluating expression: division by zero"
        );
        assert_eq!(
            calculate("5 % 0"),
            "Error evaluating expression: integer modulo by zero"
        );
        assert!(calculate("2 +").starts_with("Error evaluating expression:"));
        assert!(calculate("(1").starts_with("Error evaluating expression:"));
        assert!(calculate("1 2").starts_with("Error evaluating expression:"));
        assert!(calculate("2 $ 3").starts_with("Error evaluating expression:"));
        assert!(calculate("").starts_with("Error evaluating expression:"));
        assert_eq!(
            calculate("9223372036854775807 + 1"),
            "Error evaluating expression: integer overflow"
        );
    }

    #[test]
    fn test_float_power_out_of_range() {
        assert_eq!(
            calculate("10.0 ** 400"),
            "Error evaluating expression: numerical result out of range"
        );
        assert_eq!(calculate("2.0 ** 10"), "Result: 1024.0");
    }

    #[test]
    fn test_long_chain_rejected() {
        let chain = vec!["1"; 500_000].join("+");
        assert_eq!(
            calculate(&chain),
            "Error evaluating expression: invalid syntax: expression too long"
        );

        let short = vec!["1"; 500].join("+");
        assert_eq!(calculate(&short), "Result: 500");
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert!(calculate(&deep).starts_with("Error evaluating expression:"));

        let within_length = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(
            calculate(&within_length),
            "Error evaluating expression: invalid syntax: expression too deeply nested"
        );

        let unary = format!("{}1", "-".repeat(500));
        assert_eq!(
            calculate(&unary),
            "Error evaluating expression: invalid syntax: expression too deeply nested"
        );

        let powers = vec!["2"; 100].join("**");
        assert_eq!(
            calculate(&powers),
            "Error evaluating expression: invalid syntax: expression too deeply nested"
        );

        assert_eq!(calculate("((((((2 + 3))))))"), "Result: 5");
        assert_eq!(calculate(&format!("{}1", "-".repeat(10))), "Result: 1");
    }

    #[test]
    fn test_evaluate_value() {
        assert_eq!(evaluate("1.5 * 2").unwrap(), Number::Float(3.0));
        assert_eq!(evaluate(".5 + 1").unwrap(), Number::Float(1.5));
        assert_eq!(evaluate("1e3").unwrap(), Number::Float(1000.0));
    }
}
