//! condition.rs — compiles and evaluates per-breakpoint boolean expressions.
//!
//! The expression grammar, lexer, and recursive-descent parser are grounded on
//! `crates/vitte-debugger/src/eval.rs` (adapted from `color_eyre` to `anyhow`
//! to match this crate's error stack). The compile-cache, soft wall-clock
//! budget, and conservative-fallback semantics are grounded on
//! `dapper/_frame_eval/condition_evaluator.py`'s `ConditionEvaluator`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result as AnyResult};
use parking_lot::Mutex;

use crate::telemetry::{ReasonCode, Telemetry};

/* --------------------------- Values & environment -------------------------- */

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    fn as_number(&self) -> AnyResult<Number> {
        match self {
            Value::Int(i) => Ok(Number::Int(*i)),
            Value::Float(f) => Ok(Number::Float(*f)),
            _ => Err(anyhow!("expected number, found {}", self.type_name())),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => {
                if x.fract() == 0.0 {
                    write!(f, "{x:.0}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

/// The name-binding environment a condition is evaluated against: a frame's
/// locals, falling back to its globals. Implemented by the embedder's frame
/// type; the dispatcher and runtime never construct one themselves.
pub trait FrameEnv {
    fn get_var(&self, name: &str) -> Option<Value>;
}

/// Convenience environment backed by plain maps, used in tests and by
/// embedders without a richer frame type.
pub struct MapFrameEnv {
    pub locals: HashMap<String, Value>,
    pub globals: HashMap<String, Value>,
}

impl FrameEnv for MapFrameEnv {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.locals.get(name).or_else(|| self.globals.get(name)).cloned()
    }
}

/* --------------------------------- Lexer ----------------------------------- */

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    Null,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Eof,
}

struct Lexer<'a> {
    s: &'a [u8],
    i: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { s: src.as_bytes(), i: 0 }
    }

    fn next_token(&mut self) -> AnyResult<Tok> {
        self.skip_ws();
        if self.eof() {
            return Ok(Tok::Eof);
        }
        let c = self.peek();

        if is_ident_start(c) {
            let start = self.i;
            self.i += 1;
            while !self.eof() && is_ident_part(self.peek()) {
                self.i += 1;
            }
            let s = std::str::from_utf8(&self.s[start..self.i]).unwrap().to_string();
            return Ok(match s.as_str() {
                "true" => Tok::True,
                "false" => Tok::False,
                "null" | "none" | "None" => Tok::Null,
                _ => Tok::Ident(s),
            });
        }

        if c.is_ascii_digit() {
            return self.lex_number();
        }

        if c == b'"' || c == b'\'' {
            return self.lex_string(c);
        }

        if let Some(op) = self.try_two_char_op() {
            return Ok(op);
        }

        self.i += 1;
        Ok(match c {
            b'(' => Tok::LParen,
            b')' => Tok::RParen,
            b'+' => Tok::Plus,
            b'-' => Tok::Minus,
            b'*' => Tok::Star,
            b'/' => Tok::Slash,
            b'%' => Tok::Percent,
            b'!' => Tok::Bang,
            b'<' => Tok::Lt,
            b'>' => Tok::Gt,
            other => return Err(anyhow!("unexpected character: {}", other as char)),
        })
    }

    fn skip_ws(&mut self) {
        while !self.eof() {
            let c = self.peek();
            if c == b' ' || c == b'\t' || c == b'\n' || c == b'\r' {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
    fn peek(&self) -> u8 {
        self.s[self.i]
    }

    fn lex_number(&mut self) -> AnyResult<Tok> {
        let start = self.i;
        let mut saw_dot = false;
        while !self.eof() {
            let c = self.peek();
            if c.is_ascii_digit() {
                self.i += 1;
            } else if c == b'.' && !saw_dot {
                saw_dot = true;
                self.i += 1;
            } else {
                break;
            }
        }
        let s = std::str::from_utf8(&self.s[start..self.i]).unwrap();
        if saw_dot {
            Ok(Tok::Float(s.parse().map_err(|_| anyhow!("invalid float: {s}"))?))
        } else {
            Ok(Tok::Int(s.parse().map_err(|_| anyhow!("invalid int: {s}"))?))
        }
    }

    fn lex_string(&mut self, quote: u8) -> AnyResult<Tok> {
        self.i += 1;
        let mut out = String::new();
        while !self.eof() {
            let c = self.peek();
            self.i += 1;
            if c == quote {
                return Ok(Tok::Str(out));
            }
            if c == b'\\' && !self.eof() {
                let e = self.peek();
                self.i += 1;
                match e {
                    b'"' => out.push('"'),
                    b'\'' => out.push('\''),
                    b'\\' => out.push('\\'),
                    b'n' => out.push('\n'),
                    b't' => out.push('\t'),
                    other => return Err(anyhow!("invalid escape: \\{}", other as char)),
                }
            } else {
                out.push(c as char);
            }
        }
        Err(anyhow!("unterminated string literal"))
    }

    fn try_two_char_op(&mut self) -> Option<Tok> {
        let two = self.s.get(self.i..self.i + 2)?;
        let t = match two {
            b"&&" => Tok::AndAnd,
            b"||" => Tok::OrOr,
            b"==" => Tok::EqEq,
            b"!=" => Tok::NotEq,
            b"<=" => Tok::Le,
            b">=" => Tok::Ge,
            _ => return None,
        };
        self.i += 2;
        Some(t)
    }

}

fn is_ident_start(c: u8) -> bool {
    c == b'_' || (c as char).is_ascii_alphabetic()
}
fn is_ident_part(c: u8) -> bool {
    is_ident_start(c) || (c as char).is_ascii_digit()
}

/* --------------------------------- Parser ----------------------------------- */

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Var(String),
    Unary(UnOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum UnOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

struct Parser<'a> {
    lx: Lexer<'a>,
    look: Tok,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> AnyResult<Self> {
        let mut lx = Lexer::new(src);
        let look = lx.next_token()?;
        Ok(Self { lx, look })
    }

    fn bump(&mut self) -> AnyResult<()> {
        self.look = self.lx.next_token()?;
        Ok(())
    }

    fn parse_expr(&mut self) -> AnyResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> AnyResult<Expr> {
        let mut e = self.parse_and()?;
        while matches!(self.look, Tok::OrOr) {
            self.bump()?;
            let r = self.parse_and()?;
            e = Expr::Binary(Box::new(e), BinOp::Or, Box::new(r));
        }
        Ok(e)
    }

    fn parse_and(&mut self) -> AnyResult<Expr> {
        let mut e = self.parse_equality()?;
        while matches!(self.look, Tok::AndAnd) {
            self.bump()?;
            let r = self.parse_equality()?;
            e = Expr::Binary(Box::new(e), BinOp::And, Box::new(r));
        }
        Ok(e)
    }

    fn parse_equality(&mut self) -> AnyResult<Expr> {
        let mut e = self.parse_comparison()?;
        loop {
            match self.look {
                Tok::EqEq => {
                    self.bump()?;
                    let r = self.parse_comparison()?;
                    e = Expr::Binary(Box::new(e), BinOp::Eq, Box::new(r));
                }
                Tok::NotEq => {
                    self.bump()?;
                    let r = self.parse_comparison()?;
                    e = Expr::Binary(Box::new(e), BinOp::Ne, Box::new(r));
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_comparison(&mut self) -> AnyResult<Expr> {
        let mut e = self.parse_term()?;
        loop {
            match self.look {
                Tok::Lt => {
                    self.bump()?;
                    let r = self.parse_term()?;
                    e = Expr::Binary(Box::new(e), BinOp::Lt, Box::new(r));
                }
                Tok::Le => {
                    self.bump()?;
                    let r = self.parse_term()?;
                    e = Expr::Binary(Box::new(e), BinOp::Le, Box::new(r));
                }
                Tok::Gt => {
                    self.bump()?;
                    let r = self.parse_term()?;
                    e = Expr::Binary(Box::new(e), BinOp::Gt, Box::new(r));
                }
                Tok::Ge => {
                    self.bump()?;
                    let r = self.parse_term()?;
                    e = Expr::Binary(Box::new(e), BinOp::Ge, Box::new(r));
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_term(&mut self) -> AnyResult<Expr> {
        let mut e = self.parse_factor()?;
        loop {
            match self.look {
                Tok::Plus => {
                    self.bump()?;
                    let r = self.parse_factor()?;
                    e = Expr::Binary(Box::new(e), BinOp::Add, Box::new(r));
                }
                Tok::Minus => {
                    self.bump()?;
                    let r = self.parse_factor()?;
                    e = Expr::Binary(Box::new(e), BinOp::Sub, Box::new(r));
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_factor(&mut self) -> AnyResult<Expr> {
        let mut e = self.parse_unary()?;
        loop {
            match self.look {
                Tok::Star => {
                    self.bump()?;
                    let r = self.parse_unary()?;
                    e = Expr::Binary(Box::new(e), BinOp::Mul, Box::new(r));
                }
                Tok::Slash => {
                    self.bump()?;
                    let r = self.parse_unary()?;
                    e = Expr::Binary(Box::new(e), BinOp::Div, Box::new(r));
                }
                Tok::Percent => {
                    self.bump()?;
                    let r = self.parse_unary()?;
                    e = Expr::Binary(Box::new(e), BinOp::Rem, Box::new(r));
                }
                _ => break,
            }
        }
        Ok(e)
    }

    fn parse_unary(&mut self) -> AnyResult<Expr> {
        match self.look {
            Tok::Bang => {
                self.bump()?;
                Ok(Expr::Unary(UnOp::Not, Box::new(self.parse_unary()?)))
            }
            Tok::Plus => {
                self.bump()?;
                Ok(Expr::Unary(UnOp::Plus, Box::new(self.parse_unary()?)))
            }
            Tok::Minus => {
                self.bump()?;
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> AnyResult<Expr> {
        let e = match self.look.clone() {
            Tok::True => {
                self.bump()?;
                Expr::Literal(Value::Bool(true))
            }
            Tok::False => {
                self.bump()?;
                Expr::Literal(Value::Bool(false))
            }
            Tok::Null => {
                self.bump()?;
                Expr::Literal(Value::Null)
            }
            Tok::Int(i) => {
                self.bump()?;
                Expr::Literal(Value::Int(i))
            }
            Tok::Float(x) => {
                self.bump()?;
                Expr::Literal(Value::Float(x))
            }
            Tok::Str(s) => {
                self.bump()?;
                Expr::Literal(Value::Str(s))
            }
            Tok::Ident(name) => {
                self.bump()?;
                Expr::Var(name)
            }
            Tok::LParen => {
                self.bump()?;
                let e = self.parse_expr()?;
                if !matches!(self.look, Tok::RParen) {
                    return Err(anyhow!("expected ')'"));
                }
                self.bump()?;
                e
            }
            other => return Err(anyhow!("unexpected token: {other:?}")),
        };
        Ok(e)
    }
}

fn eval(ast: &Expr, env: &dyn FrameEnv) -> AnyResult<Value> {
    match ast {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => env.get_var(name).ok_or_else(|| anyhow!("undefined name: {name}")),
        Expr::Unary(op, e) => {
            let v = eval(e, env)?;
            match op {
                UnOp::Not => Ok(Value::Bool(!v.truthy())),
                UnOp::Neg => match v.as_number()? {
                    Number::Int(i) => Ok(Value::Int(-i)),
                    Number::Float(f) => Ok(Value::Float(-f)),
                },
                UnOp::Plus => match v.as_number()? {
                    Number::Int(i) => Ok(Value::Int(i)),
                    Number::Float(f) => Ok(Value::Float(f)),
                },
            }
        }
        Expr::Binary(a, op, b) => {
            match op {
                BinOp::And => {
                    let va = eval(a, env)?;
                    if !va.truthy() {
                        return Ok(Value::Bool(false));
                    }
                    return Ok(Value::Bool(eval(b, env)?.truthy()));
                }
                BinOp::Or => {
                    let va = eval(a, env)?;
                    if va.truthy() {
                        return Ok(Value::Bool(true));
                    }
                    return Ok(Value::Bool(eval(b, env)?.truthy()));
                }
                _ => {}
            }
            let va = eval(a, env)?;
            let vb = eval(b, env)?;
            match op {
                BinOp::Add => num_bin(va, vb, |x, y| x + y, |x, y| x + y, |s, t| Ok(Value::Str(format!("{s}{t}")))),
                BinOp::Sub => num_bin(va, vb, |x, y| x - y, |x, y| x - y, |_, _| Err(anyhow!("'-' undefined for strings"))),
                BinOp::Mul => num_bin(va, vb, |x, y| x * y, |x, y| x * y, |_, _| Err(anyhow!("'*' undefined for strings"))),
                BinOp::Div => num_bin(va, vb, |x, y| x / y, |x, y| x / y, |_, _| Err(anyhow!("'/' undefined for strings"))),
                BinOp::Rem => num_bin(va, vb, |x, y| x % y, |x, y| x % y, |_, _| Err(anyhow!("'%' undefined for strings"))),
                BinOp::Eq => Ok(Value::Bool(eq_value(&va, &vb))),
                BinOp::Ne => Ok(Value::Bool(!eq_value(&va, &vb))),
                BinOp::Lt => Ok(Value::Bool(cmp_value(&va, &vb, |o| o.is_lt())?)),
                BinOp::Le => Ok(Value::Bool(cmp_value(&va, &vb, |o| !o.is_gt())?)),
                BinOp::Gt => Ok(Value::Bool(cmp_value(&va, &vb, |o| o.is_gt())?)),
                BinOp::Ge => Ok(Value::Bool(cmp_value(&va, &vb, |o| !o.is_lt())?)),
                BinOp::And | BinOp::Or => unreachable!(),
            }
        }
    }
}

fn num_bin(
    va: Value,
    vb: Value,
    iop: fn(i64, i64) -> i64,
    fop: fn(f64, f64) -> f64,
    sop: fn(String, String) -> AnyResult<Value>,
) -> AnyResult<Value> {
    match (va, vb) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(iop(a, b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(fop(a, b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(fop(a as f64, b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(fop(a, b as f64))),
        (Value::Str(a), Value::Str(b)) => sop(a, b),
        (Value::Str(a), b) => sop(a, b.to_string()),
        (a, Value::Str(b)) => sop(a.to_string(), b),
        (a, b) => Err(anyhow!("invalid numeric operation between {} and {}", a.type_name(), b.type_name())),
    }
}

fn eq_value(a: &Value, b: &Value) -> bool {
    use Value::*;
    match (a, b) {
        (Bool(x), Bool(y)) => x == y,
        (Int(x), Int(y)) => x == y,
        (Float(x), Float(y)) => x == y,
        (Int(x), Float(y)) | (Float(y), Int(x)) => (*x as f64) == *y,
        (Str(x), Str(y)) => x == y,
        (Null, Null) => true,
        _ => false,
    }
}

fn cmp_value<F: Fn(std::cmp::Ordering) -> bool>(a: &Value, b: &Value, pred: F) -> AnyResult<bool> {
    use Value::*;
    let ord = match (a, b) {
        (Int(x), Int(y)) => x.cmp(y),
        (Float(x), Float(y)) => x.partial_cmp(y).ok_or_else(|| anyhow!("NaN is not comparable"))?,
        (Int(x), Float(y)) => (*x as f64).partial_cmp(y).ok_or_else(|| anyhow!("NaN is not comparable"))?,
        (Float(x), Int(y)) => x.partial_cmp(&(*y as f64)).ok_or_else(|| anyhow!("NaN is not comparable"))?,
        (Str(x), Str(y)) => x.cmp(y),
        _ => return Err(anyhow!("comparison not supported between {} and {}", a.type_name(), b.type_name())),
    };
    Ok(pred(ord))
}

/* ------------------------------ Cache & budget ------------------------------ */

/// `{expression_text, compiled_code_or_error}`. Compile-once, eval-many.
#[derive(Clone)]
enum CompiledCondition {
    Ok(Arc<Expr>),
    Err(String),
}

/// `evaluate`'s return shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionResult {
    pub passed: bool,
    pub fallback: bool,
    pub error: Option<String>,
    pub elapsed_s: f64,
}

/// Compiles and evaluates boolean breakpoint conditions with a soft
/// wall-clock budget and a conservative (`passed=true`) fallback on any
/// runtime error. A single mutex guards the expression cache; it is released
/// before compiling or evaluating (see spec.md §4.3/§8: the evaluator must not
/// deadlock if the condition itself triggers another dispatch on this thread).
pub struct ConditionEvaluator {
    cache: Mutex<HashMap<String, CompiledCondition>>,
    enabled: bool,
    budget: Duration,
    telemetry: Arc<Telemetry>,
}

impl ConditionEvaluator {
    pub fn new(enabled: bool, budget: Duration, telemetry: Arc<Telemetry>) -> Self {
        Self { cache: Mutex::new(HashMap::new()), enabled, budget, telemetry }
    }

    pub fn evaluate(&self, expression_text: &str, frame: &dyn FrameEnv) -> ConditionResult {
        if !self.enabled {
            return ConditionResult { passed: true, fallback: true, error: None, elapsed_s: 0.0 };
        }

        let start = Instant::now();
        let compiled = self.compiled(expression_text);

        let result = match compiled {
            CompiledCondition::Err(msg) => ConditionResult {
                passed: true,
                fallback: true,
                error: Some(msg.clone()),
                elapsed_s: start.elapsed().as_secs_f64(),
            },
            CompiledCondition::Ok(expr) => match eval(&expr, frame) {
                Ok(v) => ConditionResult {
                    passed: v.truthy(),
                    fallback: false,
                    error: None,
                    elapsed_s: start.elapsed().as_secs_f64(),
                },
                Err(e) => {
                    let mut ctx = HashMap::new();
                    ctx.insert("expression".to_string(), expression_text.to_string());
                    ctx.insert("error".to_string(), e.to_string());
                    self.telemetry
                        .record_with_context(ReasonCode::SelectiveTracingAnalysisFailed, ctx);
                    ConditionResult {
                        passed: true,
                        fallback: true,
                        error: Some(e.to_string()),
                        elapsed_s: start.elapsed().as_secs_f64(),
                    }
                }
            },
        };

        if result.elapsed_s >= self.budget.as_secs_f64() {
            let mut ctx = HashMap::new();
            ctx.insert("expression".to_string(), expression_text.to_string());
            ctx.insert("elapsed_s".to_string(), result.elapsed_s.to_string());
            self.telemetry.record_with_context(ReasonCode::BudgetExceeded, ctx);
        }

        result
    }

    fn compiled(&self, expression_text: &str) -> CompiledCondition {
        {
            let cache = self.cache.lock();
            if let Some(c) = cache.get(expression_text) {
                return c.clone();
            }
        }
        // Compile outside the lock; only the cache insert is guarded.
        let compiled = match Parser::new(expression_text).and_then(|mut p| p.parse_expr()) {
            Ok(expr) => CompiledCondition::Ok(Arc::new(expr)),
            Err(e) => CompiledCondition::Err(e.to_string()),
        };
        let mut cache = self.cache.lock();
        cache.entry(expression_text.to_string()).or_insert_with(|| compiled.clone());
        compiled
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, Value)]) -> MapFrameEnv {
        MapFrameEnv {
            locals: vars.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            globals: HashMap::new(),
        }
    }

    fn evaluator() -> ConditionEvaluator {
        ConditionEvaluator::new(true, Duration::from_millis(100), Arc::new(Telemetry::default()))
    }

    #[test]
    fn passes_when_true() {
        let e = evaluator();
        let frame = env(&[("x", Value::Int(10))]);
        let r = e.evaluate("x > 5", &frame);
        assert!(r.passed);
        assert!(!r.fallback);
        assert!(r.error.is_none());
    }

    #[test]
    fn fails_closed_to_true_on_undefined_name() {
        let e = evaluator();
        let frame = env(&[]);
        let r = e.evaluate("no_such_var > 0", &frame);
        assert!(r.passed);
        assert!(r.fallback);
        assert!(r.error.is_some());
        assert_eq!(e.telemetry_budget_exceeded_or_analysis_failed_count(), 1);
    }

    #[test]
    fn compile_errors_are_cached() {
        let e = evaluator();
        let frame = env(&[]);
        let r1 = e.evaluate("x +", &frame);
        assert!(r1.passed && r1.fallback);
        assert_eq!(e.cache_size(), 1);
        let r2 = e.evaluate("x +", &frame);
        assert!(r2.passed && r2.fallback);
        assert_eq!(e.cache_size(), 1); // still one entry: cache hit, no recompile
    }

    #[test]
    fn disabled_always_passes_without_evaluating() {
        let e = ConditionEvaluator::new(false, Duration::from_millis(100), Arc::new(Telemetry::default()));
        let frame = env(&[]);
        let r = e.evaluate("no_such_var > 0", &frame);
        assert!(r.passed && r.fallback && r.elapsed_s == 0.0);
        assert_eq!(e.cache_size(), 0);
    }

    #[test]
    fn clear_cache_resets_size() {
        let e = evaluator();
        let frame = env(&[("x", Value::Int(1))]);
        e.evaluate("x > 0", &frame);
        assert_eq!(e.cache_size(), 1);
        e.clear_cache();
        assert_eq!(e.cache_size(), 0);
    }

    impl ConditionEvaluator {
        fn telemetry_budget_exceeded_or_analysis_failed_count(&self) -> u64 {
            let snap = self.telemetry.snapshot();
            snap.reason_counts.selective_tracing_analysis_failed
        }
    }
}
