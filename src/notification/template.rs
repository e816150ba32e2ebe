//! 文本模板引擎 - 渲染通知标题和正文
//!
//! 语法：
//! - `{{ expr }}` 输出表达式的值
//! - `{% if expr %}` / `{% elif expr %}` / `{% else %}` / `{% endif %}`
//! - `{% for item in expr %}` ... `{% endfor %}`，循环体内可用 `loop.index`（从 1 开始）、
//!   `loop.first`、`loop.last`
//! - `{# 注释 #}`
//!
//! 表达式支持点号路径（`commit.revision`）、字符串/整数/布尔字面量、`~` 拼接、
//! 比较运算（`==` `!=` `<` `<=` `>` `>=`）、`and` / `or` / `not`、括号和函数调用。
//! 内置 `len`，其它函数在渲染时通过 [`Context`] 注入。
//!
//! 模板只解析一次，语法错误在构造时暴露；未定义的变量渲染为空字符串。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// 渲染上下文中的值
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// 由 `(key, value)` 构造 map
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn get(&self, key: &str) -> Value {
        match self {
            Value::Map(map) => map.get(key).cloned().unwrap_or_default(),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null | Value::Map(_) => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Map(value)
    }
}

/// 模板语法错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct TemplateError {
    pub line: usize,
    pub message: String,
}

impl TemplateError {
    fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(source.len());
        Self {
            line: source[..offset].matches('\n').count() + 1,
            message: message.into(),
        }
    }
}

/// 渲染时的求值错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("unknown function {0:?}")]
    UnknownFunction(String),
    #[error("{function}: {message}")]
    BadArguments { function: String, message: String },
    #[error("cannot iterate over {0}")]
    NotIterable(&'static str),
    #[error("cannot compare {0} with {1}")]
    Incomparable(&'static str, &'static str),
}

impl RenderError {
    pub fn bad_arguments(function: &str, message: impl Into<String>) -> Self {
        Self::BadArguments {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

/// 模板可调用的函数
pub type Function<'a> = Box<dyn Fn(&[Value]) -> Result<Value, RenderError> + 'a>;

/// 单次渲染可见的变量和函数
#[derive(Default)]
pub struct Context<'a> {
    vars: BTreeMap<String, Value>,
    functions: BTreeMap<String, Function<'a>>,
}

impl<'a> Context<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, RenderError> + 'a,
    {
        self.functions.insert(name.into(), Box::new(f));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("vars", &self.vars)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    /// 函数名、参数、所在标签的偏移
    Call(String, Vec<Expr>, usize),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Concat(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Output(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    For {
        var: String,
        iterable: Expr,
        body: Vec<Node>,
    },
}

/// 解析后的模板
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let nodes = parser.parse_root()?;

        Ok(Self {
            source: source.to_string(),
            nodes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 模板调用的所有函数名
    pub fn functions(&self) -> BTreeSet<&str> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }

    /// 检查模板是否调用了未知函数（既非内置也不在 `known` 中）
    pub fn check_functions(&self, known: &[&str]) -> Result<(), TemplateError> {
        match self
            .calls()
            .into_iter()
            .find(|(name, _)| !known.contains(name) && !BUILTIN_FUNCTIONS.contains(name))
        {
            Some((name, offset)) => Err(TemplateError::at(
                &self.source,
                offset,
                format!("unknown function {:?}", name),
            )),
            None => Ok(()),
        }
    }

    fn calls(&self) -> Vec<(&str, usize)> {
        let mut calls = Vec::new();
        collect_node_calls(&self.nodes, &mut calls);
        calls
    }

    pub fn render(&self, ctx: &Context<'_>) -> Result<String, RenderError> {
        let mut scope = Scope {
            ctx,
            locals: Vec::new(),
        };
        let mut out = String::with_capacity(self.source.len());
        render_nodes(&self.nodes, &mut scope, &mut out)?;
        Ok(out)
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ── 分词 ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Token<'s> {
    Text(&'s str),
    Output(&'s str, usize),
    Tag(&'s str, usize),
}

fn tokenize(source: &str) -> Result<Vec<Token<'_>>, TemplateError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(rel) = source[cursor..].find('{') {
        let open = cursor + rel;
        let marker = bytes.get(open + 1).copied();
        let close = match marker {
            Some(b'{') => "}}",
            Some(b'%') => "%}",
            Some(b'#') => "#}",
            _ => {
                cursor = open + 1;
                continue;
            }
        };

        if open > text_start {
            tokens.push(Token::Text(&source[text_start..open]));
        }

        let inner_start = open + 2;
        let end = source[inner_start..]
            .find(close)
            .map(|rel| inner_start + rel)
            .ok_or_else(|| {
                TemplateError::at(source, open, format!("unclosed {:?}", &source[open..inner_start]))
            })?;
        let inner = source[inner_start..end].trim();

        match marker {
            Some(b'{') => tokens.push(Token::Output(inner, open)),
            Some(b'%') => tokens.push(Token::Tag(inner, open)),
            _ => {}
        }

        cursor = end + close.len();
        text_start = cursor;
    }

    if text_start < source.len() {
        tokens.push(Token::Text(&source[text_start..]));
    }

    Ok(tokens)
}

// ── 块解析 ──────────────────────────────────────────────────────────────────

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token<'s>>,
    pos: usize,
}

/// 结束一个块的标签：关键字、剩余内容和偏移
type Terminator<'s> = (&'s str, &'s str, usize);

impl<'s> Parser<'s> {
    fn parse_root(&mut self) -> Result<Vec<Node>, TemplateError> {
        let (nodes, _) = self.parse_block(&[], 0)?;
        Ok(nodes)
    }

    fn parse_block(
        &mut self,
        terminators: &[&str],
        opened_at: usize,
    ) -> Result<(Vec<Node>, Option<Terminator<'s>>), TemplateError> {
        let mut nodes = Vec::new();

        while self.pos < self.tokens.len() {
            let token = &self.tokens[self.pos];
            self.pos += 1;

            match *token {
                Token::Text(text) => nodes.push(Node::Text(text.to_string())),
                Token::Output(inner, offset) => {
                    nodes.push(Node::Output(parse_expr(self.source, inner, offset)?));
                }
                Token::Tag(inner, offset) => {
                    let (keyword, rest) = split_keyword(inner);
                    match keyword {
                        "if" => nodes.push(self.parse_if(rest, offset)?),
                        "for" => nodes.push(self.parse_for(rest, offset)?),
                        kw if terminators.contains(&kw) => {
                            return Ok((nodes, Some((kw, rest, offset))));
                        }
                        other => {
                            return Err(TemplateError::at(
                                self.source,
                                offset,
                                format!("unexpected tag {:?}", other),
                            ));
                        }
                    }
                }
            }
        }

        match terminators.last() {
            Some(end) => Err(TemplateError::at(
                self.source,
                opened_at,
                format!("missing {{% {} %}}", end),
            )),
            None => Ok((nodes, None)),
        }
    }

    fn parse_if(&mut self, cond: &'s str, offset: usize) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut otherwise = Vec::new();
        let mut cond = parse_expr(self.source, cond, offset)?;

        loop {
            let (body, end) = self.parse_block(&["elif", "else", "endif"], offset)?;
            branches.push((cond, body));

            match end {
                Some(("elif", rest, at)) => cond = parse_expr(self.source, rest, at)?,
                Some(("else", _, _)) => {
                    let (body, _) = self.parse_block(&["endif"], offset)?;
                    otherwise = body;
                    break;
                }
                _ => break,
            }
        }

        Ok(Node::If { branches, otherwise })
    }

    fn parse_for(&mut self, header: &'s str, offset: usize) -> Result<Node, TemplateError> {
        let (var, rest) = split_keyword(header);
        let (in_kw, iterable) = split_keyword(rest);

        if !is_identifier(var) || in_kw != "in" || iterable.is_empty() {
            return Err(TemplateError::at(
                self.source,
                offset,
                format!("expected `for <name> in <expr>`, got {:?}", header),
            ));
        }

        let iterable = parse_expr(self.source, iterable, offset)?;
        let (body, _) = self.parse_block(&["endfor"], offset)?;

        Ok(Node::For {
            var: var.to_string(),
            iterable,
            body,
        })
    }
}

fn split_keyword(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ── 表达式解析 ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Dot,
    Comma,
    LParen,
    RParen,
    Tilde,
    Cmp(CmpOp),
}

fn lex_expr(source: &str, text: &str, offset: usize) -> Result<Vec<Tok>, TemplateError> {
    let err = |message: String| TemplateError::at(source, offset, message);
    let mut toks = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '.' => {
                chars.next();
                toks.push(Tok::Dot);
            }
            ',' => {
                chars.next();
                toks.push(Tok::Comma);
            }
            '(' => {
                chars.next();
                toks.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                toks.push(Tok::RParen);
            }
            '~' => {
                chars.next();
                toks.push(Tok::Tilde);
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = chars.next_if_eq(&'=').is_some();
                let op = match (c, followed_by_eq) {
                    ('=', true) => CmpOp::Eq,
                    ('!', true) => CmpOp::Ne,
                    ('<', false) => CmpOp::Lt,
                    ('<', true) => CmpOp::Le,
                    ('>', false) => CmpOp::Gt,
                    ('>', true) => CmpOp::Ge,
                    _ => return Err(err(format!("unexpected {:?} in {:?}", c, text))),
                };
                toks.push(Tok::Cmp(op));
            }
            '"' | '\'' => {
                chars.next();
                let mut literal = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some('n') => literal.push('\n'),
                            Some('t') => literal.push('\t'),
                            Some(other) => literal.push(other),
                            None => break,
                        },
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => literal.push(ch),
                    }
                }
                if !closed {
                    return Err(err(format!("unterminated string in {:?}", text)));
                }
                toks.push(Tok::Str(literal));
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                    digits.push(d);
                }
                let n = digits
                    .parse()
                    .map_err(|_| err(format!("integer out of range: {}", digits)))?;
                toks.push(Tok::Int(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(d) = chars.next_if(|d| d.is_ascii_alphanumeric() || *d == '_') {
                    ident.push(d);
                }
                toks.push(Tok::Ident(ident));
            }
            other => return Err(err(format!("unexpected {:?} in {:?}", other, text))),
        }
    }

    Ok(toks)
}

fn parse_expr(source: &str, text: &str, offset: usize) -> Result<Expr, TemplateError> {
    if text.is_empty() {
        return Err(TemplateError::at(source, offset, "empty expression"));
    }

    let toks = lex_expr(source, text, offset)?;
    let mut parser = ExprParser {
        source,
        text,
        offset,
        toks,
        pos: 0,
    };
    let expr = parser.parse_or()?;

    if parser.pos < parser.toks.len() {
        return Err(parser.error("unexpected trailing input"));
    }

    Ok(expr)
}

struct ExprParser<'s> {
    source: &'s str,
    text: &'s str,
    offset: usize,
    toks: Vec<Tok>,
    pos: usize,
}

impl ExprParser<'_> {
    fn error(&self, message: &str) -> TemplateError {
        TemplateError::at(self.source, self.offset, format!("{} in {:?}", message, self.text))
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Ident(id)) if id == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, TemplateError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, TemplateError> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, TemplateError> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, TemplateError> {
        let lhs = self.parse_concat()?;
        if let Some(Tok::Cmp(op)) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.parse_concat()?;
            return Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_concat(&mut self) -> Result<Expr, TemplateError> {
        let first = self.parse_primary()?;
        if self.peek() != Some(&Tok::Tilde) {
            return Ok(first);
        }

        let mut parts = vec![first];
        while self.eat(&Tok::Tilde) {
            parts.push(self.parse_primary()?);
        }
        Ok(Expr::Concat(parts))
    }

    fn parse_primary(&mut self) -> Result<Expr, TemplateError> {
        match self.next() {
            Some(Tok::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Tok::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Tok::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&Tok::RParen) {
                    return Err(self.error("expected `)`"));
                }
                Ok(inner)
            }
            Some(Tok::Ident(id)) => match id.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "and" | "or" | "not" | "in" => Err(self.error("unexpected keyword")),
                _ if self.eat(&Tok::LParen) => self.parse_call(id),
                _ => self.parse_path(id),
            },
            _ => Err(self.error("expected a value")),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, TemplateError> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(Expr::Call(name, args, self.offset));
        }

        loop {
            args.push(self.parse_or()?);
            if self.eat(&Tok::RParen) {
                return Ok(Expr::Call(name, args, self.offset));
            }
            if !self.eat(&Tok::Comma) {
                return Err(self.error("expected `,` or `)`"));
            }
        }
    }

    fn parse_path(&mut self, head: String) -> Result<Expr, TemplateError> {
        let mut segments = vec![head];
        while self.eat(&Tok::Dot) {
            match self.next() {
                Some(Tok::Ident(id)) => segments.push(id),
                _ => return Err(self.error("expected a field name after `.`")),
            }
        }
        Ok(Expr::Path(segments))
    }
}

fn collect_node_calls<'t>(nodes: &'t [Node], names: &mut Vec<(&'t str, usize)>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Output(expr) => collect_expr_calls(expr, names),
            Node::If { branches, otherwise } => {
                for (cond, body) in branches {
                    collect_expr_calls(cond, names);
                    collect_node_calls(body, names);
                }
                collect_node_calls(otherwise, names);
            }
            Node::For { iterable, body, .. } => {
                collect_expr_calls(iterable, names);
                collect_node_calls(body, names);
            }
        }
    }
}

fn collect_expr_calls<'t>(expr: &'t Expr, names: &mut Vec<(&'t str, usize)>) {
    match expr {
        Expr::Literal(_) | Expr::Path(_) => {}
        Expr::Call(name, args, offset) => {
            names.push((name.as_str(), *offset));
            args.iter().for_each(|a| collect_expr_calls(a, names));
        }
        Expr::Not(inner) => collect_expr_calls(inner, names),
        Expr::And(l, r) | Expr::Or(l, r) | Expr::Compare(_, l, r) => {
            collect_expr_calls(l, names);
            collect_expr_calls(r, names);
        }
        Expr::Concat(parts) => parts.iter().for_each(|p| collect_expr_calls(p, names)),
    }
}

// ── 渲染 ────────────────────────────────────────────────────────────────────

struct Scope<'c, 'a> {
    ctx: &'c Context<'a>,
    locals: Vec<(String, Value)>,
}

impl Scope<'_, '_> {
    fn lookup(&self, name: &str) -> Value {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .or_else(|| self.ctx.vars.get(name).cloned())
            .unwrap_or_default()
    }
}

fn render_nodes(nodes: &[Node], scope: &mut Scope<'_, '_>, out: &mut String) -> Result<(), RenderError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => {
                let value = eval(expr, scope)?;
                out.push_str(&value.to_string());
            }
            Node::If { branches, otherwise } => {
                let mut taken = None;
                for (cond, body) in branches {
                    if eval(cond, scope)?.is_truthy() {
                        taken = Some(body);
                        break;
                    }
                }
                render_nodes(taken.unwrap_or(otherwise), scope, out)?;
            }
            Node::For { var, iterable, body } => {
                let items = match eval(iterable, scope)? {
                    Value::List(items) => items,
                    Value::Null => Vec::new(),
                    other => return Err(RenderError::NotIterable(other.type_name())),
                };
                let count = items.len();

                for (index, item) in items.into_iter().enumerate() {
                    let loop_info = Value::map([
                        ("index", Value::from(index + 1)),
                        ("first", Value::Bool(index == 0)),
                        ("last", Value::Bool(index + 1 == count)),
                    ]);
                    scope.locals.push(("loop".to_string(), loop_info));
                    scope.locals.push((var.clone(), item));
                    let result = render_nodes(body, scope, out);
                    scope.locals.truncate(scope.locals.len() - 2);
                    result?;
                }
            }
        }
    }
    Ok(())
}

fn eval(expr: &Expr, scope: &Scope<'_, '_>) -> Result<Value, RenderError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(segments) => {
            let mut iter = segments.iter();
            let mut value = match iter.next() {
                Some(head) => scope.lookup(head),
                None => Value::Null,
            };
            for segment in iter {
                value = value.get(segment);
            }
            Ok(value)
        }
        Expr::Call(name, args, _) => {
            let args = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &args, scope.ctx)
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, scope)?.is_truthy())),
        Expr::And(l, r) => Ok(Value::Bool(
            eval(l, scope)?.is_truthy() && eval(r, scope)?.is_truthy(),
        )),
        Expr::Or(l, r) => Ok(Value::Bool(
            eval(l, scope)?.is_truthy() || eval(r, scope)?.is_truthy(),
        )),
        Expr::Compare(op, l, r) => compare(*op, &eval(l, scope)?, &eval(r, scope)?),
        Expr::Concat(parts) => {
            let mut joined = String::new();
            for part in parts {
                joined.push_str(&eval(part, scope)?.to_string());
            }
            Ok(Value::Str(joined))
        }
    }
}

fn call(name: &str, args: &[Value], ctx: &Context<'_>) -> Result<Value, RenderError> {
    if let Some(f) = ctx.functions.get(name) {
        return f(args);
    }

    match name {
        "len" => match args {
            [Value::Str(s)] => Ok(Value::from(s.chars().count())),
            [Value::List(items)] => Ok(Value::from(items.len())),
            [Value::Map(map)] => Ok(Value::from(map.len())),
            [Value::Null] => Ok(Value::Int(0)),
            [other] => Err(RenderError::bad_arguments(
                "len",
                format!("unsupported type {}", other.type_name()),
            )),
            _ => Err(RenderError::bad_arguments("len", "expected 1 argument")),
        },
        _ => Err(RenderError::UnknownFunction(name.to_string())),
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<Value, RenderError> {
    let result = match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        _ => {
            let ordering = match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => return Err(RenderError::Incomparable(lhs.type_name(), rhs.type_name())),
            };
            match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }
        }
    };
    Ok(Value::Bool(result))
}

/// 内置函数
pub const BUILTIN_FUNCTIONS: &[&str] = &["len"];
