//! Path-expression syntax: tokenizer, AST and recursive-descent parser.
//!
//! Covers the XPath 1.0 subset used by mapping descriptors: location paths
//! with the common axes, predicates, unions, boolean and comparison
//! operators, additive arithmetic and a core function library.

use std::fmt;

/// Errors raised while compiling or evaluating a path expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum XPathError {
    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("unknown function '{0}()'")]
    UnknownFunction(String),

    #[error("function '{function}()' expects {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("namespace prefix '{0}' is not bound")]
    UnboundPrefix(String),

    #[error("expression does not select nodes")]
    NotNodeSet,
}

impl XPathError {
    fn syntax(position: usize, message: impl Into<String>) -> Self {
        XPathError::Syntax {
            position,
            message: message.into(),
        }
    }
}

/// A compiled path expression together with its source text.
///
/// Compilation errors are kept rather than raised, so a malformed
/// expression only fails when it is evaluated.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    compiled: Result<Expr, XPathError>,
}

impl Expression {
    pub fn compile(source: &str) -> Self {
        Self {
            source: source.to_string(),
            compiled: parse(source),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// An empty expression means "nothing to extract".
    pub fn is_empty(&self) -> bool {
        self.source.trim().is_empty()
    }

    pub fn ast(&self) -> Result<&Expr, XPathError> {
        self.compiled.as_ref().map_err(Clone::clone)
    }

    pub fn compile_error(&self) -> Option<&XPathError> {
        self.compiled.as_ref().err()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(String),
    Number(f64),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Path(LocationPath),
    /// A primary expression filtered by predicates, optionally followed by steps
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Function(Function, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "attribute" => Axis::Attribute,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// `*`
    Any,
    /// `prefix:*`
    PrefixAny(String),
    Name { prefix: Option<String>, local: String },
    Text,
    Node,
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Last,
    Position,
    Count,
    LocalName,
    Name,
    String,
    Concat,
    StartsWith,
    Contains,
    SubstringBefore,
    SubstringAfter,
    StringLength,
    NormalizeSpace,
    Not,
    True,
    False,
    Boolean,
    Number,
    Sum,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "last" => Function::Last,
            "position" => Function::Position,
            "count" => Function::Count,
            "local-name" => Function::LocalName,
            "name" => Function::Name,
            "string" => Function::String,
            "concat" => Function::Concat,
            "starts-with" => Function::StartsWith,
            "contains" => Function::Contains,
            "substring-before" => Function::SubstringBefore,
            "substring-after" => Function::SubstringAfter,
            "string-length" => Function::StringLength,
            "normalize-space" => Function::NormalizeSpace,
            "not" => Function::Not,
            "true" => Function::True,
            "false" => Function::False,
            "boolean" => Function::Boolean,
            "number" => Function::Number,
            "sum" => Function::Sum,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Last => "last",
            Function::Position => "position",
            Function::Count => "count",
            Function::LocalName => "local-name",
            Function::Name => "name",
            Function::String => "string",
            Function::Concat => "concat",
            Function::StartsWith => "starts-with",
            Function::Contains => "contains",
            Function::SubstringBefore => "substring-before",
            Function::SubstringAfter => "substring-after",
            Function::StringLength => "string-length",
            Function::NormalizeSpace => "normalize-space",
            Function::Not => "not",
            Function::True => "true",
            Function::False => "false",
            Function::Boolean => "boolean",
            Function::Number => "number",
            Function::Sum => "sum",
        }
    }

    /// Allowed argument counts as (min, max, description)
    fn arity(&self) -> (usize, Option<usize>, &'static str) {
        match self {
            Function::Last | Function::Position | Function::True | Function::False => (0, Some(0), "0"),
            Function::Count | Function::Not | Function::Boolean | Function::Sum => (1, Some(1), "1"),
            Function::LocalName
            | Function::Name
            | Function::String
            | Function::StringLength
            | Function::NormalizeSpace
            | Function::Number => (0, Some(1), "0 or 1"),
            Function::Concat => (2, None, "2 or more"),
            Function::StartsWith
            | Function::Contains
            | Function::SubstringBefore
            | Function::SubstringAfter => (2, Some(2), "2"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Pipe,
    Plus,
    Minus,
    Star,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Literal(String),
    Number(f64),
    /// `local`, `prefix:local` or `prefix:*`
    Name { prefix: Option<String>, local: String },
    /// An axis name followed by `::`
    Axis(String),
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, XPathError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let next = chars.get(i + 1).copied();

        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => {
                i += 2;
                Token::DoubleSlash
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            '.' if next == Some('.') => {
                i += 2;
                Token::DotDot
            }
            '.' if next.map_or(false, |n| n.is_ascii_digit()) => {
                let (number, end) = read_number(&chars, i);
                i = end;
                Token::Number(number)
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '@' => {
                i += 1;
                Token::At
            }
            ',' => {
                i += 1;
                Token::Comma
            }
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '[' => {
                i += 1;
                Token::LBracket
            }
            ']' => {
                i += 1;
                Token::RBracket
            }
            '|' => {
                i += 1;
                Token::Pipe
            }
            '+' => {
                i += 1;
                Token::Plus
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '*' => {
                i += 1;
                Token::Star
            }
            '=' => {
                i += 1;
                Token::Eq
            }
            '!' if next == Some('=') => {
                i += 2;
                Token::NotEq
            }
            '<' if next == Some('=') => {
                i += 2;
                Token::Le
            }
            '<' => {
                i += 1;
                Token::Lt
            }
            '>' if next == Some('=') => {
                i += 2;
                Token::Ge
            }
            '>' => {
                i += 1;
                Token::Gt
            }
            '"' | '\'' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| XPathError::syntax(start, "unterminated string literal"))?;
                let literal: String = chars[i + 1..i + 1 + close].iter().collect();
                i += close + 2;
                Token::Literal(literal)
            }
            c if c.is_ascii_digit() => {
                let (number, end) = read_number(&chars, i);
                i = end;
                Token::Number(number)
            }
            c if is_name_start(c) => {
                let (name, end) = read_name(&chars, i);
                i = end;

                if chars.get(i) == Some(&':') && chars.get(i + 1) == Some(&':') {
                    i += 2;
                    Token::Axis(name)
                } else if chars.get(i) == Some(&':') && chars.get(i + 1) == Some(&'*') {
                    i += 2;
                    Token::Name {
                        prefix: Some(name),
                        local: "*".to_string(),
                    }
                } else if chars.get(i) == Some(&':')
                    && chars.get(i + 1).map_or(false, |&ch| is_name_start(ch))
                {
                    let (local, end) = read_name(&chars, i + 1);
                    i = end;
                    Token::Name {
                        prefix: Some(name),
                        local,
                    }
                } else {
                    Token::Name {
                        prefix: None,
                        local: name,
                    }
                }
            }
            other => {
                return Err(XPathError::syntax(start, format!("unexpected character '{}'", other)));
            }
        };

        tokens.push((start, token));
    }

    Ok(tokens)
}

fn read_number(chars: &[char], start: usize) -> (f64, usize) {
    let mut end = start;
    let mut seen_dot = false;

    while end < chars.len() {
        match chars[end] {
            c if c.is_ascii_digit() => end += 1,
            '.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }

    let text: String = chars[start..end].iter().collect();
    // Only digits and one dot were consumed, so this always parses
    (text.parse().unwrap_or(f64::NAN), end)
}

fn read_name(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start + 1;
    while end < chars.len() && is_name_char(chars[end]) {
        end += 1;
    }
    (chars[start..end].iter().collect(), end)
}

/// Parse an expression into its AST.
pub fn parse(source: &str) -> Result<Expr, XPathError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(XPathError::syntax(0, "empty expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.chars().count(),
    };

    let expr = parser.parse_or()?;

    if let Some((position, token)) = parser.tokens.get(parser.pos) {
        return Err(XPathError::syntax(*position, format!("unexpected token {:?}", token)));
    }

    Ok(expr)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(_, token)| token)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, token)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), XPathError> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(XPathError::syntax(
                self.position(),
                format!("expected {:?}, found {:?}", expected, token),
            )),
            None => Err(XPathError::syntax(
                self.position(),
                format!("expected {:?}, found end of expression", expected),
            )),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name { prefix: None, local }) if local == keyword)
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_equality()?;
        while self.peek_keyword("and") {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        if self.peek() == Some(&Token::Minus) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_path()?;
        while self.peek() == Some(&Token::Pipe) {
            self.advance();
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_path(&mut self) -> Result<Expr, XPathError> {
        match self.peek() {
            Some(Token::Slash) => {
                self.advance();
                let steps = if self.at_step_start() {
                    self.parse_relative_steps()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path(LocationPath { absolute: true, steps }))
            }
            Some(Token::DoubleSlash) => {
                self.advance();
                let mut steps = vec![Step::descendant_or_self()];
                steps.extend(self.parse_relative_steps()?);
                Ok(Expr::Path(LocationPath { absolute: true, steps }))
            }
            Some(Token::Literal(_)) | Some(Token::Number(_)) | Some(Token::LParen) => self.parse_filter(),
            Some(Token::Name { local, .. })
                if self.peek_at(1) == Some(&Token::LParen) && !is_node_type(local) =>
            {
                self.parse_filter()
            }
            Some(_) if self.at_step_start() => {
                let steps = self.parse_relative_steps()?;
                Ok(Expr::Path(LocationPath { absolute: false, steps }))
            }
            Some(token) => Err(XPathError::syntax(
                self.position(),
                format!("unexpected token {:?}", token),
            )),
            None => Err(XPathError::syntax(self.position(), "unexpected end of expression")),
        }
    }

    fn parse_filter(&mut self) -> Result<Expr, XPathError> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;

        let mut steps = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.advance();
                    steps.push(self.parse_step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.advance();
                    steps.push(Step::descendant_or_self());
                    steps.push(self.parse_step()?);
                }
                _ => break,
            }
        }

        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }

        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Literal(text)) => Ok(Expr::Literal(text)),
            Some(Token::Number(number)) => Ok(Expr::Number(number)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name { prefix, local }) => {
                if prefix.is_some() {
                    return Err(XPathError::UnknownFunction(format!(
                        "{}:{}",
                        prefix.unwrap_or_default(),
                        local
                    )));
                }
                let function = Function::from_name(&local)
                    .ok_or_else(|| XPathError::UnknownFunction(local.clone()))?;
                let args = self.parse_arguments()?;

                let (min, max, expected) = function.arity();
                if args.len() < min || max.map_or(false, |max| args.len() > max) {
                    return Err(XPathError::Arity {
                        function: function.name(),
                        expected,
                        found: args.len(),
                    });
                }

                Ok(Expr::Function(function, args))
            }
            Some(token) => Err(XPathError::syntax(position, format!("unexpected token {:?}", token))),
            None => Err(XPathError::syntax(position, "unexpected end of expression")),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, XPathError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();

        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(args);
        }

        loop {
            args.push(self.parse_or()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => {
                    return Err(XPathError::syntax(
                        self.position(),
                        "expected ',' or ')' in argument list",
                    ))
                }
            }
        }
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot)
                | Some(Token::DotDot)
                | Some(Token::At)
                | Some(Token::Star)
                | Some(Token::Name { .. })
                | Some(Token::Axis(_))
        )
    }

    fn parse_relative_steps(&mut self) -> Result<Vec<Step>, XPathError> {
        let mut steps = vec![self.parse_step()?];
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.advance();
                    steps.push(self.parse_step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.advance();
                    steps.push(Step::descendant_or_self());
                    steps.push(self.parse_step()?);
                }
                _ => return Ok(steps),
            }
        }
    }

    fn parse_step(&mut self) -> Result<Step, XPathError> {
        match self.peek() {
            Some(Token::Dot) => {
                self.advance();
                return Ok(Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            Some(Token::DotDot) => {
                self.advance();
                return Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            _ => {}
        }

        let axis = match self.peek() {
            Some(Token::At) => {
                self.advance();
                Axis::Attribute
            }
            Some(Token::Axis(name)) => {
                let axis = Axis::from_name(name).ok_or_else(|| {
                    XPathError::syntax(self.position(), format!("unknown axis '{}'", name))
                })?;
                self.advance();
                axis
            }
            _ => Axis::Child,
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;

        Ok(Step { axis, test, predicates })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, XPathError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Star) => Ok(NodeTest::Any),
            Some(Token::Name { prefix: Some(prefix), local }) if local == "*" => {
                Ok(NodeTest::PrefixAny(prefix))
            }
            Some(Token::Name { prefix: None, local })
                if is_node_type(&local) && self.peek() == Some(&Token::LParen) =>
            {
                self.expect(Token::LParen)?;
                self.expect(Token::RParen)?;
                Ok(match local.as_str() {
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => NodeTest::Node,
                })
            }
            Some(Token::Name { prefix, local }) => Ok(NodeTest::Name { prefix, local }),
            Some(token) => Err(XPathError::syntax(
                position,
                format!("expected a node test, found {:?}", token),
            )),
            None => Err(XPathError::syntax(position, "expected a node test")),
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, XPathError> {
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.advance();
            predicates.push(self.parse_or()?);
            self.expect(Token::RBracket)?;
        }
        Ok(predicates)
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "text" | "node" | "comment")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(local: &str) -> Step {
        Step {
            axis: Axis::Child,
            test: NodeTest::Name {
                prefix: None,
                local: local.to_string(),
            },
            predicates: Vec::new(),
        }
    }

    #[test]
    fn test_parse_relative_path() {
        let expr = parse("a/b").unwrap();
        assert_eq!(
            expr,
            Expr::Path(LocationPath {
                absolute: false,
                steps: vec![child("a"), child("b")],
            })
        );
    }

    #[test]
    fn test_parse_descendant_shorthand() {
        let expr = parse(".//diagnosis").unwrap();
        match expr {
            Expr::Path(path) => {
                assert!(!path.absolute);
                assert_eq!(path.steps.len(), 3);
                assert_eq!(path.steps[0].axis, Axis::SelfAxis);
                assert_eq!(path.steps[1].axis, Axis::DescendantOrSelf);
                assert_eq!(path.steps[2], child("diagnosis"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_attribute_and_prefixed_names() {
        let expr = parse("cda:code/@displayName").unwrap();
        match expr {
            Expr::Path(path) => {
                assert_eq!(
                    path.steps[0].test,
                    NodeTest::Name {
                        prefix: Some("cda".to_string()),
                        local: "code".to_string()
                    }
                );
                assert_eq!(path.steps[1].axis, Axis::Attribute);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_predicates_and_functions() {
        let expr = parse("item[@type = 'x' and position() > 1][last()]").unwrap();
        match expr {
            Expr::Path(path) => assert_eq!(path.steps[0].predicates.len(), 2),
            other => panic!("unexpected {:?}", other),
        }

        let expr = parse("concat(@a, '-', @b)").unwrap();
        assert!(matches!(expr, Expr::Function(Function::Concat, ref args) if args.len() == 3));
    }

    #[test]
    fn test_parse_explicit_axes_and_node_types() {
        let expr = parse("ancestor::section/title/text()").unwrap();
        match expr {
            Expr::Path(path) => {
                assert_eq!(path.steps[0].axis, Axis::Ancestor);
                assert_eq!(path.steps[2].test, NodeTest::Text);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_union_and_arithmetic() {
        assert!(matches!(parse("a | b").unwrap(), Expr::Union(_, _)));
        assert!(matches!(parse("count(a) - 1").unwrap(), Expr::Binary(BinaryOp::Sub, _, _)));
        assert!(matches!(parse("-1").unwrap(), Expr::Negate(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse(""), Err(XPathError::Syntax { .. })));
        assert!(matches!(parse("a/"), Err(XPathError::Syntax { .. })));
        assert!(matches!(parse("'open"), Err(XPathError::Syntax { .. })));
        assert!(matches!(parse("a[1"), Err(XPathError::Syntax { .. })));
        assert!(matches!(parse("bogus(1)"), Err(XPathError::UnknownFunction(_))));
        assert!(matches!(parse("count()"), Err(XPathError::Arity { .. })));
        assert!(matches!(parse("sideways::a"), Err(XPathError::Syntax { .. })));
    }

    #[test]
    fn test_expression_keeps_compile_error() {
        let expression = Expression::compile("a[");
        assert!(expression.compile_error().is_some());
        assert!(expression.ast().is_err());
        assert_eq!(expression.source(), "a[");

        assert!(Expression::compile("  ").is_empty());
        assert!(!Expression::compile("@code").is_empty());
    }
}
