//! Stylesheet engine for rendering embedded documents.
//!
//! Supported subset:
//! - top level: `template` (`match` and/or `name`, optional `priority`);
//!   `output`, `strip-space`, `preserve-space`, `param` and non-instruction
//!   elements are ignored
//! - instructions: `apply-templates [select]`, `call-template`, `value-of`,
//!   `for-each`, `if`, `choose`/`when`/`otherwise`, `text`, `attribute`
//! - literal result elements, with `{expr}` attribute value templates
//! - paths: `/`, `//`, `.`, `..`, `@name`, `@*`, `name`, `*`, `text()`,
//!   `node()`; patterns are `|`-separated paths of child/attribute steps
//! - expressions: paths, string and number literals, `=`, `!=`, `and`,
//!   `or`, `not(..)`, `true()`, `false()`, parentheses
//!
//! Names compare by local name, so source prefixes need not match the
//! stylesheet's. Template rule conflicts resolve by priority, then by the
//! last rule in the stylesheet.

use std::collections::HashMap;

use super::markup::{local_name, parse_markup, Document, NodeId, NodeKind};
use super::DocumentError;

const XSL_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// Nested template invocations allowed before a transform is aborted.
pub const MAX_DEPTH: usize = 256;

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    At,
    LParen,
    RParen,
    Eq,
    NotEq,
    Pipe,
    Star,
    Dot,
    DotDot,
    Literal(String),
    Number(f64),
    Name(String),
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn tokenize(source: &str) -> Result<Vec<Token>, DocumentError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if !next.is_some_and(|n| n.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '@' | '(' | ')' | '=' | '|' | '*' => {
                tokens.push(match c {
                    '@' => Token::At,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '=' => Token::Eq,
                    '|' => Token::Pipe,
                    _ => Token::Star,
                });
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| expr_error(source, "unterminated string literal"))?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text
                    .parse()
                    .map_err(|_| expr_error(source, format!("bad number {text}")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return Err(expr_error(source, format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

fn expr_error(source: &str, message: impl std::fmt::Display) -> DocumentError {
    DocumentError::Stylesheet(format!("expression '{source}': {message}"))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Child,
    Attribute,
    Parent,
    SelfNode,
    DescendantOrSelf,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    /// Local name.
    Name(String),
    AnyElement,
    Text,
    AnyNode,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
}

#[derive(Debug, Clone, PartialEq)]
struct PathExpr {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Path(PathExpr),
    Literal(String),
    Number(f64),
    Bool(bool),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        left: Box<Expr>,
        right: Box<Expr>,
        equal: bool,
    },
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Result<Self, DocumentError> {
        Ok(Self {
            source,
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

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

    fn expect(&mut self, token: Token) -> Result<(), DocumentError> {
        match self.advance() {
            Some(t) if t == token => Ok(()),
            other => Err(self.error(format!("expected {token:?}, found {other:?}"))),
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> DocumentError {
        expr_error(self.source, message)
    }

    fn finish(&self) -> Result<(), DocumentError> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(self.error(format!("unexpected {t:?}"))),
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == word)
    }

    fn expr(&mut self) -> Result<Expr, DocumentError> {
        let mut left = self.and_expr()?;
        while self.is_keyword("or") {
            self.advance();
            left = Expr::Or(Box::new(left), Box::new(self.and_expr()?));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, DocumentError> {
        let mut left = self.compare_expr()?;
        while self.is_keyword("and") {
            self.advance();
            left = Expr::And(Box::new(left), Box::new(self.compare_expr()?));
        }
        Ok(left)
    }

    fn compare_expr(&mut self) -> Result<Expr, DocumentError> {
        let left = self.primary()?;
        let equal = match self.peek() {
            Some(Token::Eq) => true,
            Some(Token::NotEq) => false,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.primary()?;
        Ok(Expr::Compare {
            left: Box::new(left),
            right: Box::new(right),
            equal,
        })
    }

    fn primary(&mut self) -> Result<Expr, DocumentError> {
        match self.peek().cloned() {
            Some(Token::Literal(s)) => {
                self.advance();
                Ok(Expr::Literal(s))
            }
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Name(name))
                if self.peek_at(1) == Some(&Token::LParen) && name != "text" && name != "node" =>
            {
                self.advance();
                self.advance();
                let call = match name.as_str() {
                    "not" => Expr::Not(Box::new(self.expr()?)),
                    "true" => Expr::Bool(true),
                    "false" => Expr::Bool(false),
                    other => return Err(self.error(format!("unsupported function {other}()"))),
                };
                self.expect(Token::RParen)?;
                Ok(call)
            }
            _ => Ok(Expr::Path(self.path()?)),
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn path(&mut self) -> Result<PathExpr, DocumentError> {
        let mut path = PathExpr {
            absolute: false,
            steps: Vec::new(),
        };
        match self.peek() {
            Some(Token::Slash) => {
                self.advance();
                path.absolute = true;
                if !self.starts_step() {
                    return Ok(path);
                }
            }
            Some(Token::DoubleSlash) => {
                self.advance();
                path.absolute = true;
                path.steps.push(descendant_or_self());
            }
            _ => {}
        }

        loop {
            path.steps.push(self.step()?);
            match self.peek() {
                Some(Token::Slash) => {
                    self.advance();
                }
                Some(Token::DoubleSlash) => {
                    self.advance();
                    path.steps.push(descendant_or_self());
                }
                _ => return Ok(path),
            }
        }
    }

    fn step(&mut self) -> Result<Step, DocumentError> {
        let step = match self.advance() {
            Some(Token::Dot) => Step {
                axis: Axis::SelfNode,
                test: NodeTest::AnyNode,
            },
            Some(Token::DotDot) => Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
            },
            Some(Token::At) => {
                let test = match self.advance() {
                    Some(Token::Star) => NodeTest::AnyElement,
                    Some(Token::Name(n)) => NodeTest::Name(local_name(&n).to_string()),
                    other => return Err(self.error(format!("expected attribute name, found {other:?}"))),
                };
                Step {
                    axis: Axis::Attribute,
                    test,
                }
            }
            Some(Token::Star) => Step {
                axis: Axis::Child,
                test: NodeTest::AnyElement,
            },
            Some(Token::Name(name)) => {
                let test = if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    self.expect(Token::RParen)?;
                    match name.as_str() {
                        "text" => NodeTest::Text,
                        "node" => NodeTest::AnyNode,
                        other => return Err(self.error(format!("unsupported node test {other}()"))),
                    }
                } else if name.ends_with(':') && self.peek() == Some(&Token::Star) {
                    // prefix:*
                    self.advance();
                    NodeTest::AnyElement
                } else {
                    NodeTest::Name(local_name(&name).to_string())
                };
                Step {
                    axis: Axis::Child,
                    test,
                }
            }
            other => return Err(self.error(format!("expected a location step, found {other:?}"))),
        };
        Ok(step)
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::AnyNode,
    }
}

fn parse_expr(source: &str) -> Result<Expr, DocumentError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.expr()?;
    parser.finish()?;
    Ok(expr)
}

// ----------------------------------------------------------------------------
// Patterns
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct PatternStep {
    test: NodeTest,
    attribute: bool,
    /// Preceded by `//` rather than `/`.
    any_ancestor: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Pattern {
    absolute: bool,
    steps: Vec<PatternStep>,
}

impl Pattern {
    fn from_path(source: &str, path: PathExpr) -> Result<Self, DocumentError> {
        let mut steps = Vec::new();
        let mut any_ancestor = false;
        for step in path.steps {
            match step.axis {
                Axis::DescendantOrSelf => any_ancestor = true,
                Axis::Child | Axis::Attribute => {
                    steps.push(PatternStep {
                        test: step.test,
                        attribute: step.axis == Axis::Attribute,
                        any_ancestor,
                    });
                    any_ancestor = false;
                }
                Axis::Parent | Axis::SelfNode => {
                    return Err(expr_error(source, "'.' and '..' are not allowed in match patterns"))
                }
            }
        }
        Ok(Self {
            absolute: path.absolute,
            steps,
        })
    }

    fn default_priority(&self) -> f64 {
        match self.steps.as_slice() {
            [] => 0.5,
            [only] if !self.absolute && !only.any_ancestor => match only.test {
                NodeTest::Name(_) => 0.0,
                _ => -0.5,
            },
            _ => 0.5,
        }
    }
}

fn parse_patterns(source: &str) -> Result<Vec<Pattern>, DocumentError> {
    let mut parser = Parser::new(source)?;
    let mut patterns = vec![Pattern::from_path(source, parser.path()?)?];
    while parser.peek() == Some(&Token::Pipe) {
        parser.advance();
        patterns.push(Pattern::from_path(source, parser.path()?)?);
    }
    parser.finish()?;
    Ok(patterns)
}

// ============================================================================
// Compiled stylesheet
// ============================================================================

/// Attribute value template piece.
#[derive(Debug, Clone, PartialEq)]
enum AvtPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Instruction {
    Literal {
        name: String,
        attributes: Vec<(String, Vec<AvtPart>)>,
        body: Vec<Instruction>,
    },
    Text(String),
    ValueOf(Expr),
    ApplyTemplates(Option<Expr>),
    CallTemplate(String),
    ForEach {
        select: Expr,
        body: Vec<Instruction>,
    },
    If {
        test: Expr,
        body: Vec<Instruction>,
    },
    Choose {
        branches: Vec<(Expr, Vec<Instruction>)>,
        otherwise: Vec<Instruction>,
    },
    Attribute {
        name: Vec<AvtPart>,
        body: Vec<Instruction>,
    },
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    priority: f64,
    body: usize,
}

#[derive(Debug, Clone)]
pub struct Stylesheet {
    bodies: Vec<Vec<Instruction>>,
    rules: Vec<Rule>,
    named: HashMap<String, usize>,
}

struct Compiler<'d> {
    doc: &'d Document,
    xsl_prefix: String,
}

impl Stylesheet {
    /// Parse and compile stylesheet markup.
    pub fn compile(markup: &str) -> Result<Self, DocumentError> {
        let doc = parse_markup(markup).map_err(|e| DocumentError::Stylesheet(e.to_string()))?;
        let root = doc
            .document_element()
            .ok_or_else(|| DocumentError::Stylesheet("empty stylesheet".into()))?;

        let xsl_prefix = doc
            .attributes(root)
            .iter()
            .find(|(k, v)| k.starts_with("xmlns:") && v == XSL_NAMESPACE)
            .map(|(k, _)| k["xmlns:".len()..].to_string())
            .unwrap_or_else(|| "xsl".to_string());
        let compiler = Compiler {
            doc: &doc,
            xsl_prefix,
        };

        match compiler.instruction_name(root) {
            Some("stylesheet" | "transform") => {}
            _ => {
                return Err(DocumentError::Stylesheet(format!(
                    "root element <{}> is not a stylesheet",
                    doc.name(root).unwrap_or_default()
                )))
            }
        }

        let mut sheet = Stylesheet {
            bodies: Vec::new(),
            rules: Vec::new(),
            named: HashMap::new(),
        };

        for &child in doc.children(root) {
            match compiler.instruction_name(child) {
                Some("template") => compiler.template(child, &mut sheet)?,
                Some(other) => {
                    tracing::debug!(element = other, "Top-level stylesheet element ignored");
                }
                None => {}
            }
        }

        if sheet.bodies.is_empty() {
            return Err(DocumentError::Stylesheet("stylesheet has no templates".into()));
        }
        Ok(sheet)
    }

    /// Number of compiled template bodies.
    pub fn template_count(&self) -> usize {
        self.bodies.len()
    }

    /// Apply the stylesheet to `source`, producing a new result tree.
    pub fn transform(&self, source: &Document) -> Result<Document, DocumentError> {
        let mut run = Transform {
            sheet: self,
            src: source,
            out: Document::new(),
            depth: 0,
        };
        let out_root = run.out.root();
        run.apply_templates(vec![Item::Node(source.root())], out_root)?;
        Ok(run.out)
    }

    fn best_rule(&self, src: &Document, item: Item) -> Option<usize> {
        let mut best: Option<&Rule> = None;
        for rule in &self.rules {
            if !pattern_matches(src, &rule.pattern, item) {
                continue;
            }
            // later rules win ties
            if best.map_or(true, |b| rule.priority >= b.priority) {
                best = Some(rule);
            }
        }
        best.map(|r| r.body)
    }
}

impl Compiler<'_> {
    /// Local name of an XSL instruction element; `None` for anything else.
    fn instruction_name(&self, id: NodeId) -> Option<&str> {
        let name = self.doc.name(id)?;
        match name.split_once(':') {
            Some((prefix, local)) if prefix == self.xsl_prefix => Some(local),
            _ => None,
        }
    }

    fn required(&self, id: NodeId, attribute: &str) -> Result<&str, DocumentError> {
        self.doc.attribute(id, attribute).ok_or_else(|| {
            DocumentError::Stylesheet(format!(
                "<{}> requires a {attribute} attribute",
                self.doc.name(id).unwrap_or_default()
            ))
        })
    }

    fn template(&self, id: NodeId, sheet: &mut Stylesheet) -> Result<(), DocumentError> {
        let matches = self.doc.attribute(id, "match");
        let name = self.doc.attribute(id, "name");
        if matches.is_none() && name.is_none() {
            return Err(DocumentError::Stylesheet(
                "template needs a match or a name attribute".into(),
            ));
        }

        let explicit_priority = match self.doc.attribute(id, "priority") {
            Some(p) => Some(p.trim().parse::<f64>().map_err(|_| {
                DocumentError::Stylesheet(format!("bad template priority '{p}'"))
            })?),
            None => None,
        };

        let body = sheet.bodies.len();
        sheet.bodies.push(self.body(id)?);

        if let Some(source) = matches {
            for pattern in parse_patterns(source)? {
                let priority = explicit_priority.unwrap_or_else(|| pattern.default_priority());
                sheet.rules.push(Rule {
                    pattern,
                    priority,
                    body,
                });
            }
        }
        if let Some(name) = name {
            sheet.named.insert(name.to_string(), body);
        }
        Ok(())
    }

    fn body(&self, parent: NodeId) -> Result<Vec<Instruction>, DocumentError> {
        let mut out = Vec::new();
        for &child in self.doc.children(parent) {
            match self.doc.kind(child) {
                NodeKind::Text(text) => {
                    if !text.trim().is_empty() {
                        out.push(Instruction::Text(text.clone()));
                    }
                }
                NodeKind::Element { .. } => out.push(self.instruction(child)?),
                NodeKind::Root => {}
            }
        }
        Ok(out)
    }

    fn instruction(&self, id: NodeId) -> Result<Instruction, DocumentError> {
        let Some(kind) = self.instruction_name(id) else {
            return self.literal(id);
        };
        let instruction = match kind {
            "apply-templates" => Instruction::ApplyTemplates(
                self.doc.attribute(id, "select").map(parse_expr).transpose()?,
            ),
            "call-template" => Instruction::CallTemplate(self.required(id, "name")?.to_string()),
            "value-of" => Instruction::ValueOf(parse_expr(self.required(id, "select")?)?),
            "for-each" => Instruction::ForEach {
                select: parse_expr(self.required(id, "select")?)?,
                body: self.body(id)?,
            },
            "if" => Instruction::If {
                test: parse_expr(self.required(id, "test")?)?,
                body: self.body(id)?,
            },
            "choose" => self.choose(id)?,
            "text" => Instruction::Text(self.doc.string_value(id)),
            "attribute" => Instruction::Attribute {
                name: parse_avt(self.required(id, "name")?)?,
                body: self.body(id)?,
            },
            other => {
                return Err(DocumentError::Stylesheet(format!(
                    "unsupported instruction {}:{other}",
                    self.xsl_prefix
                )))
            }
        };
        Ok(instruction)
    }

    fn choose(&self, id: NodeId) -> Result<Instruction, DocumentError> {
        let mut branches = Vec::new();
        let mut otherwise = Vec::new();
        for &child in self.doc.children(id) {
            match (self.doc.kind(child), self.instruction_name(child)) {
                (NodeKind::Text(t), _) if t.trim().is_empty() => {}
                (_, Some("when")) => {
                    let test = parse_expr(self.required(child, "test")?)?;
                    branches.push((test, self.body(child)?));
                }
                (_, Some("otherwise")) => otherwise = self.body(child)?,
                _ => {
                    return Err(DocumentError::Stylesheet(
                        "choose may only contain when and otherwise".into(),
                    ))
                }
            }
        }
        if branches.is_empty() {
            return Err(DocumentError::Stylesheet("choose without a when branch".into()));
        }
        Ok(Instruction::Choose {
            branches,
            otherwise,
        })
    }

    fn literal(&self, id: NodeId) -> Result<Instruction, DocumentError> {
        let mut attributes = Vec::new();
        for (key, value) in self.doc.attributes(id) {
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            attributes.push((key.clone(), parse_avt(value)?));
        }
        Ok(Instruction::Literal {
            name: self.doc.name(id).unwrap_or_default().to_string(),
            attributes,
            body: self.body(id)?,
        })
    }
}

fn parse_avt(source: &str) -> Result<Vec<AvtPart>, DocumentError> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut inner = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => inner.push(c),
                        None => return Err(expr_error(source, "unterminated '{' in attribute")),
                    }
                }
                if !text.is_empty() {
                    parts.push(AvtPart::Text(std::mem::take(&mut text)));
                }
                parts.push(AvtPart::Expr(parse_expr(&inner)?));
            }
            '}' => return Err(expr_error(source, "unmatched '}' in attribute")),
            c => text.push(c),
        }
    }
    if !text.is_empty() {
        parts.push(AvtPart::Text(text));
    }
    Ok(parts)
}

// ============================================================================
// Evaluation
// ============================================================================

/// A node or one attribute of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    Node(NodeId),
    Attribute(NodeId, usize),
}

impl Item {
    /// Document-order key: an element's attributes sort right after it.
    fn order_key(self) -> (NodeId, usize) {
        match self {
            Item::Node(id) => (id, 0),
            Item::Attribute(id, index) => (id, index + 1),
        }
    }
}

#[derive(Debug, Clone)]
enum Value {
    Items(Vec<Item>),
    Text(String),
    Number(f64),
    Bool(bool),
}

fn item_string(src: &Document, item: Item) -> String {
    match item {
        Item::Node(id) => src.string_value(id),
        Item::Attribute(id, index) => src
            .attributes(id)
            .get(index)
            .map(|(_, v)| v.clone())
            .unwrap_or_default(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl Value {
    fn to_text(&self, src: &Document) -> String {
        match self {
            Value::Items(items) => items
                .first()
                .map(|&i| item_string(src, i))
                .unwrap_or_default(),
            Value::Text(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn to_bool(&self) -> bool {
        match self {
            Value::Items(items) => !items.is_empty(),
            Value::Text(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn strings(&self, src: &Document) -> Vec<String> {
        match self {
            Value::Items(items) => items.iter().map(|&i| item_string(src, i)).collect(),
            other => vec![other.to_text(src)],
        }
    }
}

fn compare(src: &Document, left: &Value, right: &Value, equal: bool) -> bool {
    if matches!(left, Value::Bool(_)) || matches!(right, Value::Bool(_)) {
        return (left.to_bool() == right.to_bool()) == equal;
    }
    let numeric = matches!(left, Value::Number(_)) || matches!(right, Value::Number(_));
    let (ls, rs) = (left.strings(src), right.strings(src));
    ls.iter().any(|l| {
        rs.iter().any(|r| {
            let same = if numeric {
                match (l.trim().parse::<f64>(), r.trim().parse::<f64>()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                }
            } else {
                l == r
            };
            same == equal
        })
    })
}

fn test_matches(src: &Document, id: NodeId, test: &NodeTest) -> bool {
    match (src.kind(id), test) {
        (_, NodeTest::AnyNode) => true,
        (NodeKind::Element { name, .. }, NodeTest::Name(wanted)) => local_name(name) == wanted,
        (NodeKind::Element { .. }, NodeTest::AnyElement) => true,
        (NodeKind::Text(_), NodeTest::Text) => true,
        _ => false,
    }
}

fn attribute_matches(src: &Document, id: NodeId, index: usize, test: &NodeTest) -> bool {
    let Some((key, _)) = src.attributes(id).get(index) else {
        return false;
    };
    if key == "xmlns" || key.starts_with("xmlns:") {
        return false;
    }
    match test {
        NodeTest::Name(wanted) => local_name(key) == wanted,
        NodeTest::AnyElement | NodeTest::AnyNode => true,
        NodeTest::Text => false,
    }
}

fn eval_path(src: &Document, path: &PathExpr, context: Item) -> Vec<Item> {
    let mut current = if path.absolute {
        vec![Item::Node(src.root())]
    } else {
        vec![context]
    };

    for step in &path.steps {
        let mut next = Vec::new();
        for &item in &current {
            step_from(src, item, step, &mut next);
        }
        next.sort_by_key(|i| i.order_key());
        next.dedup();
        current = next;
    }
    current
}

fn step_from(src: &Document, item: Item, step: &Step, out: &mut Vec<Item>) {
    match (step.axis, item) {
        (Axis::Child, Item::Node(id)) => out.extend(
            src.children(id)
                .iter()
                .filter(|&&c| test_matches(src, c, &step.test))
                .map(|&c| Item::Node(c)),
        ),
        (Axis::Attribute, Item::Node(id)) => out.extend(
            (0..src.attributes(id).len())
                .filter(|&i| attribute_matches(src, id, i, &step.test))
                .map(|i| Item::Attribute(id, i)),
        ),
        (Axis::Parent, Item::Node(id)) => out.extend(src.parent(id).map(Item::Node)),
        (Axis::Parent, Item::Attribute(id, _)) => out.push(Item::Node(id)),
        (Axis::SelfNode, Item::Node(id)) if test_matches(src, id, &step.test) => out.push(item),
        (Axis::SelfNode, Item::Attribute(..)) if step.test == NodeTest::AnyNode => out.push(item),
        (Axis::DescendantOrSelf, Item::Node(id)) => {
            out.push(item);
            out.extend(src.descendants(id).into_iter().map(Item::Node));
        }
        (Axis::DescendantOrSelf, Item::Attribute(..)) => out.push(item),
        _ => {}
    }
}

fn pattern_matches(src: &Document, pattern: &Pattern, item: Item) -> bool {
    if pattern.steps.is_empty() {
        return pattern.absolute && item == Item::Node(src.root());
    }
    steps_match(src, pattern.absolute, &pattern.steps, item)
}

fn steps_match(src: &Document, absolute: bool, steps: &[PatternStep], item: Item) -> bool {
    let Some((last, rest)) = steps.split_last() else {
        return false;
    };

    let (matched, parent) = match item {
        Item::Node(id) => (
            !last.attribute && src.kind(id) != &NodeKind::Root && test_matches(src, id, &last.test),
            src.parent(id),
        ),
        Item::Attribute(id, index) => (
            last.attribute && attribute_matches(src, id, index, &last.test),
            Some(id),
        ),
    };
    if !matched {
        return false;
    }

    if rest.is_empty() {
        return !absolute || last.any_ancestor || parent == Some(src.root());
    }

    if last.any_ancestor {
        let mut ancestor = parent;
        while let Some(a) = ancestor {
            if steps_match(src, absolute, rest, Item::Node(a)) {
                return true;
            }
            ancestor = src.parent(a);
        }
        false
    } else {
        parent.is_some_and(|p| steps_match(src, absolute, rest, Item::Node(p)))
    }
}

// ----------------------------------------------------------------------------
// Transform run
// ----------------------------------------------------------------------------

struct Transform<'a> {
    sheet: &'a Stylesheet,
    src: &'a Document,
    out: Document,
    depth: usize,
}

impl Transform<'_> {
    fn eval(&self, expr: &Expr, context: Item) -> Value {
        match expr {
            Expr::Path(path) => Value::Items(eval_path(self.src, path, context)),
            Expr::Literal(s) => Value::Text(s.clone()),
            Expr::Number(n) => Value::Number(*n),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Not(inner) => Value::Bool(!self.eval(inner, context).to_bool()),
            Expr::And(a, b) => {
                Value::Bool(self.eval(a, context).to_bool() && self.eval(b, context).to_bool())
            }
            Expr::Or(a, b) => {
                Value::Bool(self.eval(a, context).to_bool() || self.eval(b, context).to_bool())
            }
            Expr::Compare {
                left,
                right,
                equal,
            } => {
                let (l, r) = (self.eval(left, context), self.eval(right, context));
                Value::Bool(compare(self.src, &l, &r, *equal))
            }
        }
    }

    fn select(&self, expr: &Expr, context: Item) -> Result<Vec<Item>, DocumentError> {
        match self.eval(expr, context) {
            Value::Items(items) => Ok(items),
            _ => Err(DocumentError::Transform(
                "select expression does not yield nodes".into(),
            )),
        }
    }

    fn enter(&mut self) -> Result<(), DocumentError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(DocumentError::Transform(format!(
                "template nesting deeper than {MAX_DEPTH}"
            )));
        }
        Ok(())
    }

    fn apply_templates(&mut self, items: Vec<Item>, out: NodeId) -> Result<(), DocumentError> {
        self.enter()?;
        for item in items {
            match self.sheet.best_rule(self.src, item) {
                Some(body) => {
                    let sheet = self.sheet;
                    self.execute(&sheet.bodies[body], item, out)?;
                }
                None => self.builtin(item, out)?,
            }
        }
        self.depth -= 1;
        Ok(())
    }

    fn builtin(&mut self, item: Item, out: NodeId) -> Result<(), DocumentError> {
        let src = self.src;
        match item {
            Item::Node(id) => match src.kind(id) {
                NodeKind::Root | NodeKind::Element { .. } => {
                    let children = src.children(id).iter().map(|&c| Item::Node(c)).collect();
                    self.apply_templates(children, out)
                }
                NodeKind::Text(text) => {
                    self.out.append_text(out, text);
                    Ok(())
                }
            },
            Item::Attribute(..) => {
                let text = item_string(src, item);
                self.out.append_text(out, &text);
                Ok(())
            }
        }
    }

    fn execute(&mut self, body: &[Instruction], context: Item, out: NodeId) -> Result<(), DocumentError> {
        for instruction in body {
            match instruction {
                Instruction::Literal {
                    name,
                    attributes,
                    body,
                } => {
                    let element = self.out.append_element(out, name.clone());
                    for (key, avt) in attributes {
                        let value = self.avt(avt, context);
                        self.out.set_attribute(element, key, value);
                    }
                    self.execute(body, context, element)?;
                }
                Instruction::Text(text) => self.out.append_text(out, text),
                Instruction::ValueOf(expr) => {
                    let text = self.eval(expr, context).to_text(self.src);
                    self.out.append_text(out, &text);
                }
                Instruction::ApplyTemplates(select) => {
                    let items = match select {
                        Some(expr) => self.select(expr, context)?,
                        None => match context {
                            Item::Node(id) => self.src.children(id).iter().map(|&c| Item::Node(c)).collect(),
                            Item::Attribute(..) => Vec::new(),
                        },
                    };
                    self.apply_templates(items, out)?;
                }
                Instruction::CallTemplate(name) => {
                    let sheet = self.sheet;
                    let body = sheet.named.get(name).ok_or_else(|| {
                        DocumentError::Transform(format!("no template named '{name}'"))
                    })?;
                    self.enter()?;
                    self.execute(&sheet.bodies[*body], context, out)?;
                    self.depth -= 1;
                }
                Instruction::ForEach { select, body } => {
                    for item in self.select(select, context)? {
                        self.execute(body, item, out)?;
                    }
                }
                Instruction::If { test, body } => {
                    if self.eval(test, context).to_bool() {
                        self.execute(body, context, out)?;
                    }
                }
                Instruction::Choose {
                    branches,
                    otherwise,
                } => {
                    let chosen = branches
                        .iter()
                        .find(|(test, _)| self.eval(test, context).to_bool())
                        .map_or(otherwise, |(_, body)| body);
                    self.execute(chosen, context, out)?;
                }
                Instruction::Attribute { name, body } => {
                    if !self.out.is_element(out) {
                        return Err(DocumentError::Transform(
                            "attribute instruction outside an element".into(),
                        ));
                    }
                    let name = self.avt(name, context);
                    let scratch = self.out.detached_element("attribute");
                    self.execute(body, context, scratch)?;
                    let value = self.out.string_value(scratch);
                    self.out.set_attribute(out, &name, value);
                }
            }
        }
        Ok(())
    }

    fn avt(&self, parts: &[AvtPart], context: Item) -> String {
        parts
            .iter()
            .map(|part| match part {
                AvtPart::Text(t) => t.clone(),
                AvtPart::Expr(e) => self.eval(e, context).to_text(self.src),
            })
            .collect()
    }
}
