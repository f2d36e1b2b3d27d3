// SPDX-License-Identifier: MIT
//! The policy compiler: a small hand-written lexer, recursive-descent
//! parser, type checker, and evaluator for the expression sub-language
//! described in §4.1. This is the "hard engineering" component the rest of
//! the crate is built around — it deliberately does not reach for a
//! general-purpose scripting engine.

use std::collections::BTreeMap;

use regex::Regex;

use crate::domain::errors::ToolError;
use crate::domain::policy::{
    BinOp, CompiledExpr, CompiledPolicy, Expr, Method, ParamEnv, PolicyOutcome, Type, UnOp, Value,
};
use crate::domain::tool::ParamKind;

// ---------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Number(String),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

fn lex(src: &str) -> Result<Vec<Tok>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    let mut toks = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            '[' => {
                toks.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                toks.push(Tok::RBracket);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) => {
                toks.push(Tok::Dot);
                i += 1;
            }
            '+' => {
                toks.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                toks.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                toks.push(Tok::Star);
                i += 1;
            }
            '/' => {
                toks.push(Tok::Slash);
                i += 1;
            }
            '%' => {
                toks.push(Tok::Percent);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                toks.push(Tok::EqEq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                toks.push(Tok::NotEq);
                i += 2;
            }
            '!' => {
                toks.push(Tok::Bang);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                toks.push(Tok::Le);
                i += 2;
            }
            '<' => {
                toks.push(Tok::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                toks.push(Tok::Ge);
                i += 2;
            }
            '>' => {
                toks.push(Tok::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                toks.push(Tok::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                toks.push(Tok::OrOr);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        s.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    if chars[i] == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return Err("unterminated string literal".to_string());
                }
                toks.push(Tok::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                toks.push(Tok::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                toks.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    toks.push(Tok::Eof);
    Ok(toks)
}

// ---------------------------------------------------------------------
// Parser (recursive descent, precedence climbing by grammar level)
// ---------------------------------------------------------------------

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.toks[self.pos]
    }

    fn advance(&mut self) -> Tok {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), String> {
        if self.peek() == tok {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {tok:?}, found {:?}", self.peek()))
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while *self.peek() == Tok::OrOr {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_equality()?;
        while *self.peek() == Tok::AndAnd {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Tok::EqEq => BinOp::Eq,
                Tok::NotEq => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_addition()?;
        loop {
            let op = match self.peek() {
                Tok::Lt => BinOp::Lt,
                Tok::Le => BinOp::Le,
                Tok::Gt => BinOp::Gt,
                Tok::Ge => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_addition()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_addition(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplication()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplication()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplication(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Tok::Bang => {
                self.advance();
                Ok(Expr::Unary(UnOp::Not, Box::new(self.parse_unary()?)))
            }
            Tok::Minus => {
                self.advance();
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            if *self.peek() == Tok::Dot {
                self.advance();
                let name = match self.advance() {
                    Tok::Ident(n) => n,
                    other => return Err(format!("expected method name, found {other:?}")),
                };
                self.expect(&Tok::LParen)?;
                let mut args = Vec::new();
                if *self.peek() != Tok::RParen {
                    loop {
                        if name == "exists" && args.is_empty() {
                            // first arg is a bare binder identifier, not an expression
                            let binder = match self.advance() {
                                Tok::Ident(n) => n,
                                other => {
                                    return Err(format!(
                                        "expected binder identifier in exists(), found {other:?}"
                                    ))
                                }
                            };
                            args.push(Expr::Ident(binder));
                        } else {
                            args.push(self.parse_expr()?);
                        }
                        if *self.peek() == Tok::Comma {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                self.expect(&Tok::RParen)?;
                let method = match name.as_str() {
                    "size" => Method::Size,
                    "contains" => Method::Contains,
                    "startsWith" => Method::StartsWith,
                    "endsWith" => Method::EndsWith,
                    "matches" => Method::Matches,
                    "exists" => Method::Exists,
                    other => return Err(format!("unknown method '{other}'")),
                };
                expr = Expr::Call {
                    receiver: Box::new(expr),
                    method,
                    args,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Tok::Number(raw) => {
                if raw.contains('.') {
                    raw.parse::<f64>()
                        .map(Expr::FloatLit)
                        .map_err(|e| e.to_string())
                } else {
                    raw.parse::<i64>()
                        .map(Expr::IntLit)
                        .map_err(|e| e.to_string())
                }
            }
            Tok::Str(s) => Ok(Expr::StrLit(s)),
            Tok::Ident(name) if name == "true" => Ok(Expr::BoolLit(true)),
            Tok::Ident(name) if name == "false" => Ok(Expr::BoolLit(false)),
            Tok::Ident(name) if name == "int" => {
                self.expect(&Tok::LParen)?;
                let inner = self.parse_expr()?;
                self.expect(&Tok::RParen)?;
                Ok(Expr::IntCast(Box::new(inner)))
            }
            Tok::Ident(name) => Ok(Expr::Ident(name)),
            Tok::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Tok::LBracket => {
                let mut items = Vec::new();
                if *self.peek() != Tok::RBracket {
                    loop {
                        items.push(self.parse_expr()?);
                        if *self.peek() == Tok::Comma {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                self.expect(&Tok::RBracket)?;
                Ok(Expr::ListLit(items))
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

fn parse(src: &str) -> Result<Expr, String> {
    let toks = lex(src)?;
    let mut parser = Parser { toks, pos: 0 };
    let expr = parser.parse_expr()?;
    if *parser.peek() != Tok::Eof {
        return Err(format!("trailing tokens after expression: {:?}", parser.peek()));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------
// Type checker
// ---------------------------------------------------------------------

/// `None` marks a name whose type is only known at evaluation time (an
/// `exists()` binder) — operators involving it are accepted optimistically
/// and re-checked by the evaluator.
type Schema<'a> = BTreeMap<&'a str, Type>;

fn typecheck(expr: &Expr, schema: &Schema, locals: &BTreeMap<String, ()>) -> Result<Option<Type>, String> {
    match expr {
        Expr::BoolLit(_) => Ok(Some(Type::Bool)),
        Expr::IntLit(_) => Ok(Some(Type::Int)),
        Expr::FloatLit(_) => Ok(Some(Type::Float)),
        Expr::StrLit(_) => Ok(Some(Type::Str)),
        Expr::ListLit(items) => {
            for item in items {
                typecheck(item, schema, locals)?;
            }
            Ok(Some(Type::List))
        }
        Expr::Ident(name) => {
            if let Some(t) = schema.get(name.as_str()) {
                Ok(Some(*t))
            } else if locals.contains_key(name) {
                Ok(None)
            } else {
                Err(format!("unknown identifier '{name}'"))
            }
        }
        Expr::Unary(UnOp::Not, inner) => {
            let t = typecheck(inner, schema, locals)?;
            match t {
                Some(Type::Bool) | None => Ok(Some(Type::Bool)),
                Some(other) => Err(format!("'!' requires bool operand, found {other:?}")),
            }
        }
        Expr::Unary(UnOp::Neg, inner) => {
            let t = typecheck(inner, schema, locals)?;
            match t {
                Some(Type::Int) => Ok(Some(Type::Int)),
                Some(Type::Float) | None => Ok(Some(Type::Float)),
                Some(other) => Err(format!("unary '-' requires numeric operand, found {other:?}")),
            }
        }
        Expr::Binary(op, lhs, rhs) => {
            let lt = typecheck(lhs, schema, locals)?;
            let rt = typecheck(rhs, schema, locals)?;
            typecheck_binop(*op, lt, rt)
        }
        Expr::IntCast(inner) => {
            let t = typecheck(inner, schema, locals)?;
            match t {
                Some(Type::Int) | Some(Type::Float) | None => Ok(Some(Type::Int)),
                Some(other) => Err(format!("int() requires numeric operand, found {other:?}")),
            }
        }
        Expr::Call {
            receiver,
            method,
            args,
        } => typecheck_call(receiver, *method, args, schema, locals),
    }
}

fn typecheck_binop(op: BinOp, lt: Option<Type>, rt: Option<Type>) -> Result<Option<Type>, String> {
    use BinOp::*;
    match op {
        And | Or => match (lt, rt) {
            (Some(Type::Bool) | None, Some(Type::Bool) | None) => Ok(Some(Type::Bool)),
            _ => Err(format!("'{op:?}' requires bool operands, found {lt:?} and {rt:?}")),
        },
        Add | Sub | Mul | Div | Mod => match (lt, rt) {
            (Some(Type::Int), Some(Type::Int)) => Ok(Some(Type::Int)),
            (Some(Type::Int) | Some(Type::Float) | None, Some(Type::Int) | Some(Type::Float) | None) => {
                Ok(Some(Type::Float))
            }
            _ => Err(format!("'{op:?}' requires numeric operands, found {lt:?} and {rt:?}")),
        },
        Lt | Le | Gt | Ge => match (lt, rt) {
            (Some(Type::Int) | Some(Type::Float) | None, Some(Type::Int) | Some(Type::Float) | None) => {
                Ok(Some(Type::Bool))
            }
            _ => Err(format!("comparison requires numeric operands, found {lt:?} and {rt:?}")),
        },
        Eq | Ne => Ok(Some(Type::Bool)),
    }
}

fn typecheck_call(
    receiver: &Expr,
    method: Method,
    args: &[Expr],
    schema: &Schema,
    locals: &BTreeMap<String, ()>,
) -> Result<Option<Type>, String> {
    let recv_t = typecheck(receiver, schema, locals)?;
    match method {
        Method::Size => match recv_t {
            Some(Type::Str) | Some(Type::List) | None => Ok(Some(Type::Int)),
            Some(other) => Err(format!("size() requires string or list receiver, found {other:?}")),
        },
        Method::Contains => {
            if args.len() != 1 {
                return Err("contains() takes exactly one argument".to_string());
            }
            typecheck(&args[0], schema, locals)?;
            match recv_t {
                Some(Type::Str) | Some(Type::List) | None => Ok(Some(Type::Bool)),
                Some(other) => Err(format!("contains() requires string or list receiver, found {other:?}")),
            }
        }
        Method::StartsWith | Method::EndsWith => {
            if args.len() != 1 {
                return Err(format!("{method:?} takes exactly one argument"));
            }
            let arg_t = typecheck(&args[0], schema, locals)?;
            match (recv_t, arg_t) {
                (Some(Type::Str) | None, Some(Type::Str) | None) => Ok(Some(Type::Bool)),
                _ => Err(format!("{method:?} requires string operands")),
            }
        }
        Method::Matches => {
            if args.len() != 1 {
                return Err("matches() takes exactly one argument".to_string());
            }
            let arg_t = typecheck(&args[0], schema, locals)?;
            match (recv_t, arg_t) {
                (Some(Type::Str) | None, Some(Type::Str) | None) => Ok(Some(Type::Bool)),
                _ => Err("matches() requires string receiver and pattern".to_string()),
            }
        }
        Method::Exists => {
            if args.len() != 2 {
                return Err("exists() takes exactly (binder, predicate)".to_string());
            }
            match recv_t {
                Some(Type::List) | None => {}
                Some(other) => return Err(format!("exists() requires list receiver, found {other:?}")),
            }
            let binder = match &args[0] {
                Expr::Ident(n) => n.clone(),
                _ => return Err("exists() first argument must be a bare identifier".to_string()),
            };
            let mut inner_locals = locals.clone();
            inner_locals.insert(binder, ());
            let pred_t = typecheck(&args[1], schema, &inner_locals)?;
            match pred_t {
                Some(Type::Bool) | None => Ok(Some(Type::Bool)),
                Some(other) => Err(format!("exists() predicate must be bool, found {other:?}")),
            }
        }
    }
}

// ---------------------------------------------------------------------
// Public compile entrypoint
// ---------------------------------------------------------------------

/// Compile an ordered list of expressions against a parameter schema.
/// Pure and deterministic: equal (expressions, schema) pairs always compile
/// to equivalent evaluators (§3 invariant).
pub fn compile(
    tool_name: &str,
    expressions: &[String],
    params: &BTreeMap<String, ParamKind>,
) -> Result<CompiledPolicy, ToolError> {
    let schema: Schema = params.iter().map(|(k, v)| (k.as_str(), Type::from(*v))).collect();
    let locals = BTreeMap::new();
    let mut compiled = Vec::with_capacity(expressions.len());
    for source in expressions {
        let ast = parse(source).map_err(|reason| ToolError::Compilation {
            tool: tool_name.to_string(),
            reason: format!("in expression `{source}`: {reason}"),
        })?;
        let ty = typecheck(&ast, &schema, &locals).map_err(|reason| ToolError::Compilation {
            tool: tool_name.to_string(),
            reason: format!("in expression `{source}`: {reason}"),
        })?;
        if !matches!(ty, Some(Type::Bool) | None) {
            return Err(ToolError::Compilation {
                tool: tool_name.to_string(),
                reason: format!("expression `{source}` must be boolean, found {ty:?}"),
            });
        }
        compiled.push(CompiledExpr {
            source: source.clone(),
            ast,
        });
    }
    Ok(CompiledPolicy {
        expressions: compiled,
    })
}

// ---------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------

/// Evaluate every expression in `policy` against `env`, never short-circuiting
/// across the list so the caller gets the full set of violations (§4.1).
pub fn evaluate(policy: &CompiledPolicy, env: &ParamEnv) -> Result<PolicyOutcome, ToolError> {
    let mut failed = Vec::new();
    let locals = BTreeMap::new();
    for compiled in &policy.expressions {
        let value = eval(&compiled.ast, env, &locals)?;
        match value {
            Value::Bool(true) => {}
            Value::Bool(false) => failed.push(compiled.source.clone()),
            other => {
                return Err(ToolError::Internal(format!(
                    "policy expression `{}` evaluated to non-bool value {other:?}",
                    compiled.source
                )))
            }
        }
    }
    Ok(PolicyOutcome {
        satisfied: failed.is_empty(),
        failed,
    })
}

type Locals = BTreeMap<String, Value>;

fn eval(expr: &Expr, env: &ParamEnv, locals: &Locals) -> Result<Value, ToolError> {
    match expr {
        Expr::BoolLit(b) => Ok(Value::Bool(*b)),
        Expr::IntLit(i) => Ok(Value::Int(*i)),
        Expr::FloatLit(f) => Ok(Value::Float(*f)),
        Expr::StrLit(s) => Ok(Value::Str(s.clone())),
        Expr::ListLit(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, env, locals)?);
            }
            Ok(Value::List(values))
        }
        Expr::Ident(name) => {
            if let Some(v) = locals.get(name) {
                return Ok(v.clone());
            }
            match env.get(name) {
                Some(v) => Ok(v.into()),
                None => Err(ToolError::ParameterValidation(format!(
                    "parameter '{name}' referenced by policy has no value"
                ))),
            }
        }
        Expr::Unary(UnOp::Not, inner) => match eval(inner, env, locals)? {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(ToolError::Internal(format!("'!' applied to non-bool {other:?}"))),
        },
        Expr::Unary(UnOp::Neg, inner) => match eval(inner, env, locals)? {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(ToolError::Internal(format!("unary '-' applied to non-numeric {other:?}"))),
        },
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, env, locals)?;
            let r = eval(rhs, env, locals)?;
            eval_binop(*op, l, r)
        }
        Expr::IntCast(inner) => match eval(inner, env, locals)? {
            Value::Int(i) => Ok(Value::Int(i)),
            Value::Float(f) => Ok(Value::Int(f as i64)),
            other => Err(ToolError::Internal(format!("int() applied to non-numeric {other:?}"))),
        },
        Expr::Call {
            receiver,
            method,
            args,
        } => eval_call(receiver, *method, args, env, locals),
    }
}

fn eval_binop(op: BinOp, l: Value, r: Value) -> Result<Value, ToolError> {
    use BinOp::*;
    match op {
        And => match (l, r) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a && b)),
            (a, b) => Err(ToolError::Internal(format!("'&&' applied to {a:?}, {b:?}"))),
        },
        Or => match (l, r) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a || b)),
            (a, b) => Err(ToolError::Internal(format!("'||' applied to {a:?}, {b:?}"))),
        },
        Eq => Ok(Value::Bool(values_equal(&l, &r))),
        Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        Add | Sub | Mul | Div | Mod | Lt | Le | Gt | Ge => eval_numeric_binop(op, l, r),
    }
}

fn eval_numeric_binop(op: BinOp, l: Value, r: Value) -> Result<Value, ToolError> {
    use BinOp::*;
    if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
        let (a, b) = (*a, *b);
        return match op {
            Add => Ok(Value::Int(a + b)),
            Sub => Ok(Value::Int(a - b)),
            Mul => Ok(Value::Int(a * b)),
            Div => {
                if b == 0 {
                    Err(ToolError::Internal("division by zero".to_string()))
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            Mod => {
                if b == 0 {
                    Err(ToolError::Internal("modulo by zero".to_string()))
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            Lt => Ok(Value::Bool(a < b)),
            Le => Ok(Value::Bool(a <= b)),
            Gt => Ok(Value::Bool(a > b)),
            Ge => Ok(Value::Bool(a >= b)),
            _ => unreachable!(),
        };
    }
    let a = l
        .as_f64()
        .ok_or_else(|| ToolError::Internal(format!("expected numeric operand, found {l:?}")))?;
    let b = r
        .as_f64()
        .ok_or_else(|| ToolError::Internal(format!("expected numeric operand, found {r:?}")))?;
    match op {
        Add => Ok(Value::Float(a + b)),
        Sub => Ok(Value::Float(a - b)),
        Mul => Ok(Value::Float(a * b)),
        Div => Ok(Value::Float(a / b)),
        Mod => Ok(Value::Float(a % b)),
        Lt => Ok(Value::Bool(a < b)),
        Le => Ok(Value::Bool(a <= b)),
        Gt => Ok(Value::Bool(a > b)),
        Ge => Ok(Value::Bool(a >= b)),
        _ => unreachable!(),
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) => a == b,
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn eval_call(
    receiver: &Expr,
    method: Method,
    args: &[Expr],
    env: &ParamEnv,
    locals: &Locals,
) -> Result<Value, ToolError> {
    let recv = eval(receiver, env, locals)?;
    match method {
        Method::Size => match recv {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            other => Err(ToolError::Internal(format!("size() on non-sizable {other:?}"))),
        },
        Method::Contains => {
            let needle = eval(&args[0], env, locals)?;
            match (recv, &needle) {
                (Value::Str(s), Value::Str(n)) => Ok(Value::Bool(s.contains(n.as_str()))),
                (Value::List(items), n) => Ok(Value::Bool(items.iter().any(|v| values_equal(v, n)))),
                (other, _) => Err(ToolError::Internal(format!("contains() on {other:?}"))),
            }
        }
        Method::StartsWith => {
            let prefix = eval(&args[0], env, locals)?;
            match (recv, prefix) {
                (Value::Str(s), Value::Str(p)) => Ok(Value::Bool(s.starts_with(p.as_str()))),
                (other, _) => Err(ToolError::Internal(format!("startsWith() on {other:?}"))),
            }
        }
        Method::EndsWith => {
            let suffix = eval(&args[0], env, locals)?;
            match (recv, suffix) {
                (Value::Str(s), Value::Str(p)) => Ok(Value::Bool(s.ends_with(p.as_str()))),
                (other, _) => Err(ToolError::Internal(format!("endsWith() on {other:?}"))),
            }
        }
        Method::Matches => {
            let pattern = eval(&args[0], env, locals)?;
            match (recv, pattern) {
                (Value::Str(s), Value::Str(p)) => {
                    let re = Regex::new(&p)
                        .map_err(|e| ToolError::Internal(format!("invalid regex '{p}': {e}")))?;
                    Ok(Value::Bool(re.is_match(&s)))
                }
                (other, _) => Err(ToolError::Internal(format!("matches() on {other:?}"))),
            }
        }
        Method::Exists => {
            let binder = match &args[0] {
                Expr::Ident(n) => n.clone(),
                _ => unreachable!("typecheck rejects non-identifier binders"),
            };
            let items = match recv {
                Value::List(items) => items,
                other => return Err(ToolError::Internal(format!("exists() on non-list {other:?}"))),
            };
            for item in items {
                let mut inner = locals.clone();
                inner.insert(binder.clone(), item);
                match eval(&args[1], env, &inner)? {
                    Value::Bool(true) => return Ok(Value::Bool(true)),
                    Value::Bool(false) => continue,
                    other => return Err(ToolError::Internal(format!("exists() predicate returned {other:?}"))),
                }
            }
            Ok(Value::Bool(false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tool::{ParamKind, ParamValue};

    fn schema(pairs: &[(&str, ParamKind)]) -> BTreeMap<String, ParamKind> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn hello_world_scenario() {
        let schema = schema(&[("name", ParamKind::String)]);
        let policy = compile(
            "hello_world",
            &["name.size() <= 100 && !name.contains('/')".to_string()],
            &schema,
        )
        .unwrap();

        let mut env = ParamEnv::new();
        env.insert("name".to_string(), ParamValue::String("World".to_string()));
        let outcome = evaluate(&policy, &env).unwrap();
        assert!(outcome.satisfied);

        env.insert("name".to_string(), ParamValue::String("a".repeat(150)));
        let outcome = evaluate(&policy, &env).unwrap();
        assert!(!outcome.satisfied);
        assert_eq!(outcome.failed, vec!["name.size() <= 100 && !name.contains('/')"]);

        env.insert("name".to_string(), ParamValue::String("a/b".to_string()));
        let outcome = evaluate(&policy, &env).unwrap();
        assert!(!outcome.satisfied);
    }

    #[test]
    fn calculator_scenario_blocks_shell_metacharacters() {
        let schema = schema(&[("expression", ParamKind::String)]);
        let policy = compile(
            "calculator",
            &["!expression.matches('.*[;&|`].*')".to_string()],
            &schema,
        )
        .unwrap();

        let mut env = ParamEnv::new();
        env.insert("expression".to_string(), ParamValue::String("2+2".to_string()));
        assert!(evaluate(&policy, &env).unwrap().satisfied);

        env.insert(
            "expression".to_string(),
            ParamValue::String("2; rm -rf /".to_string()),
        );
        assert!(!evaluate(&policy, &env).unwrap().satisfied);
    }

    #[test]
    fn number_validator_scenario_uses_float_env() {
        let schema = schema(&[("value", ParamKind::Number)]);
        let policy = compile(
            "number_validator",
            &["value >= 0.0 && value <= 1000.0".to_string()],
            &schema,
        )
        .unwrap();

        let mut env = ParamEnv::new();
        env.insert("value".to_string(), ParamValue::Number(5.0));
        assert!(evaluate(&policy, &env).unwrap().satisfied);

        env.insert("value".to_string(), ParamValue::Number(-1.0));
        assert!(!evaluate(&policy, &env).unwrap().satisfied);
    }

    #[test]
    fn path_traversal_scenario() {
        let schema = schema(&[("filepath", ParamKind::String)]);
        let policy = compile(
            "path_traversal",
            &["!filepath.contains('../')".to_string()],
            &schema,
        )
        .unwrap();

        let mut env = ParamEnv::new();
        env.insert(
            "filepath".to_string(),
            ParamValue::String("../../../etc/passwd".to_string()),
        );
        assert!(!evaluate(&policy, &env).unwrap().satisfied);
    }

    #[test]
    fn all_expressions_are_evaluated_not_short_circuited() {
        let schema = schema(&[("a", ParamKind::Integer), ("b", ParamKind::Integer)]);
        let policy = compile(
            "multi",
            &["a > 10".to_string(), "b > 10".to_string()],
            &schema,
        )
        .unwrap();

        let mut env = ParamEnv::new();
        env.insert("a".to_string(), ParamValue::Integer(1));
        env.insert("b".to_string(), ParamValue::Integer(1));
        let outcome = evaluate(&policy, &env).unwrap();
        assert_eq!(outcome.failed, vec!["a > 10", "b > 10"]);
    }

    #[test]
    fn unknown_identifier_is_a_compile_error() {
        let schema = schema(&[("a", ParamKind::Integer)]);
        let err = compile("bad", &["b > 10".to_string()], &schema).unwrap_err();
        assert!(matches!(err, ToolError::Compilation { .. }));
    }

    #[test]
    fn non_boolean_expression_is_a_compile_error() {
        let schema = schema(&[("a", ParamKind::Integer)]);
        let err = compile("bad", &["a + 1".to_string()], &schema).unwrap_err();
        assert!(matches!(err, ToolError::Compilation { .. }));
    }

    #[test]
    fn int_cast_preserves_value_semantics() {
        let schema = schema(&[("value", ParamKind::Number)]);
        let policy = compile("cast", &["int(value) == 5".to_string()], &schema).unwrap();
        let mut env = ParamEnv::new();
        env.insert("value".to_string(), ParamValue::Number(5.0));
        assert!(evaluate(&policy, &env).unwrap().satisfied);
    }

    #[test]
    fn exists_over_list_literal() {
        let schema: BTreeMap<String, ParamKind> = BTreeMap::new();
        let policy = compile(
            "exists_demo",
            &["[1, 2, 3].exists(x, x > 2)".to_string()],
            &schema,
        )
        .unwrap();
        let env = ParamEnv::new();
        assert!(evaluate(&policy, &env).unwrap().satisfied);
    }

    #[test]
    fn missing_optional_parameter_is_evaluation_error() {
        let mut schema_map = schema(&[("name", ParamKind::String)]);
        schema_map.insert("opt".to_string(), ParamKind::String);
        let policy = compile("missing", &["opt.size() > 0".to_string()], &schema_map).unwrap();
        let env = ParamEnv::new();
        let err = evaluate(&policy, &env).unwrap_err();
        assert!(matches!(err, ToolError::ParameterValidation(_)));
    }
}
