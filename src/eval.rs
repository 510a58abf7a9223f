//! Expression evaluator (C5): a tree-walking, side-effect-free interpreter
//! over the invariant expression AST, with nil-propagation semantics and a
//! fixed built-in function catalogue.

use crate::ast::{BinOp, DatatypeKeyword, Expr, Lambda, Literal, MatchRhs, PipelineCall, UnOp};
use crate::value::{Properties, Value};

/// An error raised while evaluating an expression: undefined variable, type
/// mismatch, bad index, division by zero, or built-in misuse
///. Distinct from an invariant simply
/// evaluating to `false` — the caller surfaces this as its own
/// `E_EVAL_ERROR` diagnostic rather than a predicate failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// Reference to a name with no binding in scope and no matching
    /// property on `$self`.
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),
    /// An operator or built-in was applied to operand(s) of the wrong kind.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// A negative index, which the grammar treats as always invalid.
    #[error("invalid index: {0}")]
    BadIndex(String),
    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// A built-in was called with the wrong arity, a missing required
    /// lambda, or a lambda with the wrong parameter count.
    #[error("built-in `{0}` misuse: {1}")]
    BuiltinMisuse(String, String),
    /// A pipeline named a function outside the fixed built-in catalogue.
    #[error("unknown built-in function `{0}`")]
    UnknownBuiltin(String),
    /// An invalid regex pattern or flag set.
    #[error("invalid regex `/{0}/{1}`: {2}")]
    InvalidRegex(String, String, String),
}

/// The result of evaluating an expression.
pub type EvalResult = std::result::Result<Value, EvalError>;

/// A chain of lambda-parameter bindings, innermost last
///.
#[derive(Clone, Default)]
pub struct Scope {
    bindings: Vec<(String, Value)>,
}

impl Scope {
    /// An empty scope (no lambda bindings yet).
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    fn extended(&self, name: String, value: Value) -> Scope {
        let mut next = self.clone();
        next.bindings.push((name, value));
        next
    }
}

/// Evaluates an invariant body (or any expression) against `$self`'s
/// validated properties, with no outer lambda bindings.
pub fn evaluate(expr: &Expr, self_props: &Properties) -> EvalResult {
    let evaluator = Evaluator { self_props };
    evaluator.eval(expr, &Scope::new())
}

struct Evaluator<'a> {
    self_props: &'a Properties,
}

impl<'a> Evaluator<'a> {
    fn eval(&self, expr: &Expr, scope: &Scope) -> EvalResult {
        match expr {
            Expr::Literal(lit, _) => self.eval_literal(lit, scope),
            Expr::Var(name, _) => self.eval_var(name, scope),
            Expr::Member(e, field, _) => {
                let v = self.eval(e, scope)?;
                match v {
                    Value::Map(m) => Ok(m.get(field).cloned().unwrap_or(Value::Nil)),
                    Value::Nil => Ok(Value::Nil),
                    other => Err(EvalError::TypeMismatch(format!(
                        "cannot access field `{field}` on a {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Index(e, i, _) => {
                let v = self.eval(e, scope)?;
                let idx = self.eval(i, scope)?;
                self.eval_index(&v, &idx)
            }
            Expr::Slice(e, i, j, _) => {
                let v = self.eval(e, scope)?;
                let i = self.eval(i, scope)?;
                let j = self.eval(j, scope)?;
                self.eval_slice(&v, &i, &j)
            }
            Expr::Unary(op, e, _) => {
                let v = self.eval(e, scope)?;
                self.eval_unary(*op, v)
            }
            Expr::Binary(BinOp::And, l, r, _) => {
                let lv = self.eval(l, scope)?;
                if !truthy(&lv) {
                    return Ok(Value::Bool(false));
                }
                let rv = self.eval(r, scope)?;
                Ok(Value::Bool(truthy(&rv)))
            }
            Expr::Binary(BinOp::Or, l, r, _) => {
                let lv = self.eval(l, scope)?;
                if truthy(&lv) {
                    return Ok(Value::Bool(true));
                }
                let rv = self.eval(r, scope)?;
                Ok(Value::Bool(truthy(&rv)))
            }
            Expr::Binary(op, l, r, _) => {
                let lv = self.eval(l, scope)?;
                let rv = self.eval(r, scope)?;
                self.eval_binary(*op, lv, rv)
            }
            Expr::Match { subject, rhs, negated, .. } => {
                let v = self.eval(subject, scope)?;
                let matched = match rhs {
                    MatchRhs::Regex(re_expr) => {
                        let re_val = self.eval(re_expr, scope)?;
                        self.regex_match(&v, &re_val)?
                    }
                    MatchRhs::Datatype(kw) => datatype_matches(&v, *kw),
                };
                Ok(Value::Bool(matched != *negated))
            }
            Expr::Ternary(cond, then_e, else_e, _) => {
                let c = self.eval(cond, scope)?;
                if truthy(&c) {
                    self.eval(then_e, scope)
                } else {
                    self.eval(else_e, scope)
                }
            }
            Expr::Pipeline(call) => self.eval_pipeline(call, scope),
            Expr::LambdaLit(_) => Err(EvalError::TypeMismatch(
                "a lambda literal may only appear as a pipeline's trailing argument".to_string(),
            )),
        }
    }

    fn eval_literal(&self, lit: &Literal, scope: &Scope) -> EvalResult {
        Ok(match lit {
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Regex { pattern, flags } => Value::Regex {
                pattern: pattern.clone(),
                flags: flags.clone(),
            },
            Literal::Nil => Value::Nil,
            Literal::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item, scope)?);
                }
                Value::List(out)
            }
        })
    }

    fn eval_var(&self, name: &str, scope: &Scope) -> EvalResult {
        if let Some(v) = scope.lookup(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.self_props.get(&name.to_string()) {
            return Ok(v.clone());
        }
        Err(EvalError::UndefinedVariable(name.to_string()))
    }

    fn eval_unary(&self, op: UnOp, v: Value) -> EvalResult {
        match op {
            UnOp::Not => Ok(Value::Bool(!truthy(&v))),
            UnOp::Neg => match v {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(EvalError::TypeMismatch(format!(
                    "cannot negate a {}",
                    other.type_name()
                ))),
            },
        }
    }

    fn eval_binary(&self, op: BinOp, l: Value, r: Value) -> EvalResult {
        use BinOp::*;
        match op {
            Add | Sub | Mul | Div | Rem => arith(op, l, r),
            Eq => Ok(Value::Bool(values_equal(&l, &r))),
            Ne => Ok(Value::Bool(!values_equal(&l, &r))),
            Lt | Gt | Le | Ge => {
                if matches!(l, Value::Nil) || matches!(r, Value::Nil) {
                    return Ok(Value::Nil);
                }
                let ord = compare(&l, &r)?;
                let b = match op {
                    Lt => ord.is_lt(),
                    Gt => ord.is_gt(),
                    Le => ord.is_le(),
                    Ge => ord.is_ge(),
                    _ => unreachable!(),
                };
                Ok(Value::Bool(b))
            }
            // `And`/`Or` short-circuit and are evaluated directly in `eval`'s
            // `Expr::Binary` match (the right operand isn't evaluated at
            // all when the left already decides the result), so they never
            // reach this dispatcher.
            And | Or => unreachable!("And/Or are short-circuited in `eval` before reaching `eval_binary`"),
            Xor => match (l, r) {
                (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(a ^ b)),
                (a, b) => Err(EvalError::TypeMismatch(format!(
                    "`^` requires two booleans, found {} and {}",
                    a.type_name(),
                    b.type_name()
                ))),
            },
            In => {
                let list = r.as_list_or_empty().ok_or_else(|| {
                    EvalError::TypeMismatch(format!("`in` requires a list, found {}", r.type_name()))
                })?;
                Ok(Value::Bool(list.iter().any(|item| values_equal(item, &l))))
            }
            Match | NotMatch => {
                // Reachable only if a future grammar change routes `=~`/`!~`
                // through `BinOp` instead of `Expr::Match`; kept consistent
                // with the dedicated match-expression logic.
                let matched = self.regex_match(&l, &r)?;
                Ok(Value::Bool(if op == Match { matched } else { !matched }))
            }
        }
    }

    fn regex_match(&self, subject: &Value, re_val: &Value) -> std::result::Result<bool, EvalError> {
        let (pattern, flags) = match re_val {
            Value::Regex { pattern, flags } => (pattern.clone(), flags.clone()),
            other => {
                return Err(EvalError::TypeMismatch(format!(
                    "`=~` right-hand side must be a regex literal, found {}",
                    other.type_name()
                )))
            }
        };
        let subject = match subject {
            Value::Str(s) => s,
            other => {
                return Err(EvalError::TypeMismatch(format!(
                    "`=~` left-hand side must be a string, found {}",
                    other.type_name()
                )))
            }
        };
        let re = compile_regex(&pattern, &flags)?;
        Ok(re.is_match(subject))
    }

    fn eval_index(&self, v: &Value, idx: &Value) -> EvalResult {
        let i = match idx {
            Value::Int(i) => *i,
            other => {
                return Err(EvalError::TypeMismatch(format!(
                    "index must be an integer, found {}",
                    other.type_name()
                )))
            }
        };
        if i < 0 {
            return Err(EvalError::BadIndex(format!("negative index {i}")));
        }
        let i = i as usize;
        match v {
            Value::Nil => Ok(Value::Nil),
            Value::Str(s) => Ok(s.chars().nth(i).map(|c| Value::Str(c.to_string())).unwrap_or(Value::Nil)),
            Value::List(items) => Ok(items.get(i).cloned().unwrap_or(Value::Nil)),
            other => Err(EvalError::TypeMismatch(format!(
                "cannot index a {}",
                other.type_name()
            ))),
        }
    }

    fn eval_slice(&self, v: &Value, i: &Value, j: &Value) -> EvalResult {
        let (start, end) = (as_clamp_index(i)?, as_clamp_index(j)?);
        match v {
            Value::Nil => Ok(Value::Nil),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let (a, b) = clamp_range(start, end, chars.len());
                Ok(Value::Str(chars[a..b].iter().collect()))
            }
            Value::List(items) => {
                let (a, b) = clamp_range(start, end, items.len());
                Ok(Value::List(items[a..b].to_vec()))
            }
            other => Err(EvalError::TypeMismatch(format!(
                "cannot slice a {}",
                other.type_name()
            ))),
        }
    }

    fn call_lambda(&self, lambda: &Lambda, args: &[Value], scope: &Scope) -> EvalResult {
        if lambda.params.len() != args.len() {
            return Err(EvalError::BuiltinMisuse(
                "lambda".to_string(),
                format!("expected {} parameter(s), found {}", lambda.params.len(), args.len()),
            ));
        }
        let mut inner = scope.clone();
        for (param, value) in lambda.params.iter().zip(args.iter()) {
            inner = inner.extended(param.clone(), value.clone());
        }
        self.eval(&lambda.body, &inner)
    }

    fn eval_pipeline(&self, call: &PipelineCall, scope: &Scope) -> EvalResult {
        let receiver = self.eval(&call.receiver, scope)?;
        let mut args = Vec::with_capacity(call.args.len());
        for a in &call.args {
            args.push(self.eval(a, scope)?);
        }
        eval_builtin(self, &call.function, receiver, &args, call.lambda.as_ref(), scope)
    }
}

fn truthy(v: &Value) -> bool {
    !matches!(v, Value::Nil | Value::Bool(false))
}

fn as_clamp_index(v: &Value) -> std::result::Result<i64, EvalError> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(EvalError::TypeMismatch(format!(
            "slice bound must be an integer, found {}",
            other.type_name()
        ))),
    }
}

fn clamp_range(start: i64, end: i64, len: usize) -> (usize, usize) {
    let len = len as i64;
    let a = start.clamp(0, len) as usize;
    let b = end.clamp(0, len).max(start.clamp(0, len)) as usize;
    (a, b)
}

enum Num {
    Int(i64),
    Float(f64),
}

fn as_number(v: &Value) -> Option<Num> {
    match v {
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn to_f64(n: &Num) -> f64 {
    match n {
        Num::Int(i) => *i as f64,
        Num::Float(f) => *f,
    }
}

fn arith(op: BinOp, l: Value, r: Value) -> EvalResult {
    if matches!(l, Value::Nil) || matches!(r, Value::Nil) {
        return Ok(Value::Nil);
    }
    if op == BinOp::Add {
        if let (Value::Str(a), Value::Str(b)) = (&l, &r) {
            return Ok(Value::Str(format!("{a}{b}")));
        }
        if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) {
            return Err(EvalError::TypeMismatch(
                "`+` between a string and a number is not allowed".to_string(),
            ));
        }
    }
    let (ln, rn) = match (as_number(&l), as_number(&r)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(EvalError::TypeMismatch(format!(
                "arithmetic requires numeric operands, found {} and {}",
                l.type_name(),
                r.type_name()
            )))
        }
    };
    if op == BinOp::Rem {
        let (Num::Int(a), Num::Int(b)) = (&ln, &rn) else {
            return Err(EvalError::TypeMismatch("`%` requires integer operands".to_string()));
        };
        if *b == 0 {
            return Err(EvalError::DivisionByZero);
        }
        return Ok(Value::Int(a % b));
    }
    if let (Num::Int(a), Num::Int(b)) = (&ln, &rn) {
        return match op {
            BinOp::Add => Ok(Value::Int(a + b)),
            BinOp::Sub => Ok(Value::Int(a - b)),
            BinOp::Mul => Ok(Value::Int(a * b)),
            BinOp::Div => {
                if *b == 0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            _ => unreachable!(),
        };
    }
    let (a, b) = (to_f64(&ln), to_f64(&rn));
    match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        BinOp::Div => {
            if b == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(Value::Float(a / b))
            }
        }
        _ => unreachable!(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Regex { pattern: p1, flags: f1 }, Value::Regex { pattern: p2, flags: f2 }) => {
            p1 == p2 && f1 == f2
        }
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|v2| values_equal(v, v2)))
        }
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => to_f64(&x) == to_f64(&y),
            _ => false,
        },
    }
}

fn compare(a: &Value, b: &Value) -> std::result::Result<std::cmp::Ordering, EvalError> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => {
            return to_f64(&x)
                .partial_cmp(&to_f64(&y))
                .ok_or_else(|| EvalError::TypeMismatch("cannot compare NaN".to_string()))
        }
        _ => {}
    }
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    Err(EvalError::TypeMismatch(format!(
        "cannot compare {} and {}",
        a.type_name(),
        b.type_name()
    )))
}

fn datatype_matches(v: &Value, kw: DatatypeKeyword) -> bool {
    matches!(
        (v, kw),
        (Value::Int(_), DatatypeKeyword::Integer)
            | (Value::Float(_), DatatypeKeyword::Float)
            | (Value::Bool(_), DatatypeKeyword::Boolean)
            | (Value::Str(_), DatatypeKeyword::String)
            | (Value::Str(_), DatatypeKeyword::Timestamp)
            | (Value::Str(_), DatatypeKeyword::Date)
            | (Value::Str(_), DatatypeKeyword::Uuid)
            | (Value::List(_), DatatypeKeyword::List)
    )
}

fn compile_regex(pattern: &str, flags: &str) -> std::result::Result<regex::Regex, EvalError> {
    let mut builder = regex::RegexBuilder::new(pattern);
    for ch in flags.chars() {
        match ch {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            other => {
                return Err(EvalError::InvalidRegex(
                    pattern.to_string(),
                    flags.to_string(),
                    format!("unknown flag `{other}`"),
                ))
            }
        }
    }
    builder
        .build()
        .map_err(|e| EvalError::InvalidRegex(pattern.to_string(), flags.to_string(), e.to_string()))
}

// ---------------------------------------------------------------------
// Built-in function catalogue
// ---------------------------------------------------------------------

fn eval_builtin(
    ev: &Evaluator<'_>,
    name: &str,
    receiver: Value,
    args: &[Value],
    lambda: Option<&Lambda>,
    scope: &Scope,
) -> EvalResult {
    match name {
        "Len" => match receiver {
            Value::Nil => Ok(Value::Int(0)),
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            other => Err(EvalError::TypeMismatch(format!("Len requires a string or list, found {}", other.type_name()))),
        },
        "Sum" => {
            let items = receiver.as_list_or_empty().ok_or_else(|| {
                EvalError::TypeMismatch(format!("Sum requires a list, found {}", receiver.type_name()))
            })?;
            let mut acc_int: i64 = 0;
            let mut acc_float: f64 = 0.0;
            let mut is_float = false;
            for item in items {
                match as_number(item) {
                    Some(Num::Int(i)) if !is_float => acc_int += i,
                    Some(n) => {
                        if !is_float {
                            acc_float = acc_int as f64;
                            is_float = true;
                        }
                        acc_float += to_f64(&n);
                    }
                    None => return Err(EvalError::TypeMismatch("Sum requires numeric elements".to_string())),
                }
            }
            Ok(if is_float { Value::Float(acc_float) } else { Value::Int(acc_int) })
        }
        "First" => Ok(list_or_empty(&receiver)?.first().cloned().unwrap_or(Value::Nil)),
        "Last" => Ok(list_or_empty(&receiver)?.last().cloned().unwrap_or(Value::Nil)),
        "Sort" => {
            let mut items = list_or_empty(&receiver)?.to_vec();
            let mut err = None;
            items.sort_by(|a, b| match compare(a, b) {
                Ok(o) => o,
                Err(e) => {
                    err = Some(e);
                    std::cmp::Ordering::Equal
                }
            });
            if let Some(e) = err {
                return Err(e);
            }
            Ok(Value::List(items))
        }
        "Reverse" => {
            let mut items = list_or_empty(&receiver)?.to_vec();
            items.reverse();
            Ok(Value::List(items))
        }
        "Flatten" => {
            let mut out = Vec::new();
            for item in list_or_empty(&receiver)? {
                match item {
                    Value::List(inner) => out.extend(inner.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::List(out))
        }
        "Compact" => Ok(Value::List(
            list_or_empty(&receiver)?.iter().filter(|v| !v.is_nil()).cloned().collect(),
        )),
        "Unique" => {
            let mut out: Vec<Value> = Vec::new();
            for item in list_or_empty(&receiver)? {
                if !out.iter().any(|v| values_equal(v, item)) {
                    out.push(item.clone());
                }
            }
            Ok(Value::List(out))
        }
        "Contains" => {
            let needle = args.first().ok_or_else(|| arity_err("Contains", 1, args.len()))?;
            Ok(Value::Bool(list_or_empty(&receiver)?.iter().any(|v| values_equal(v, needle))))
        }
        "Split" => {
            let sep = as_str(args.first().ok_or_else(|| arity_err("Split", 1, args.len()))?, "Split")?;
            let s = as_str(&receiver, "Split")?;
            Ok(Value::List(s.split(sep.as_str()).map(|p| Value::Str(p.to_string())).collect()))
        }
        "Join" => {
            let sep = as_str(args.first().ok_or_else(|| arity_err("Join", 1, args.len()))?, "Join")?;
            let items = list_or_empty(&receiver)?;
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(as_str(item, "Join")?);
            }
            Ok(Value::Str(parts.join(&sep)))
        }
        "All" | "Any" | "AllOrNone" | "Filter" | "Map" | "Count" => {
            let lambda = lambda.ok_or_else(|| lambda_required(name))?;
            let items = list_or_empty(&receiver)?;
            match name {
                "All" => {
                    for item in items {
                        if !truthy(&ev.call_lambda(lambda, &[item.clone()], scope)?) {
                            return Ok(Value::Bool(false));
                        }
                    }
                    Ok(Value::Bool(true))
                }
                "Any" => {
                    for item in items {
                        if truthy(&ev.call_lambda(lambda, &[item.clone()], scope)?) {
                            return Ok(Value::Bool(true));
                        }
                    }
                    Ok(Value::Bool(false))
                }
                "AllOrNone" => {
                    let mut results = Vec::with_capacity(items.len());
                    for item in items {
                        results.push(truthy(&ev.call_lambda(lambda, &[item.clone()], scope)?));
                    }
                    let all_same = results.is_empty() || results.iter().all(|&r| r == results[0]);
                    Ok(Value::Bool(all_same))
                }
                "Filter" => {
                    let mut out = Vec::new();
                    for item in items {
                        if truthy(&ev.call_lambda(lambda, &[item.clone()], scope)?) {
                            out.push(item.clone());
                        }
                    }
                    Ok(Value::List(out))
                }
                "Map" => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(ev.call_lambda(lambda, &[item.clone()], scope)?);
                    }
                    Ok(Value::List(out))
                }
                "Count" => {
                    let mut n = 0i64;
                    for item in items {
                        if truthy(&ev.call_lambda(lambda, &[item.clone()], scope)?) {
                            n += 1;
                        }
                    }
                    Ok(Value::Int(n))
                }
                _ => unreachable!(),
            }
        }
        "Reduce" => {
            let lambda = lambda.ok_or_else(|| lambda_required("Reduce"))?;
            if lambda.params.len() != 2 {
                return Err(EvalError::BuiltinMisuse(
                    "Reduce".to_string(),
                    "requires a two-parameter lambda".to_string(),
                ));
            }
            let init = args.first().cloned().ok_or_else(|| arity_err("Reduce", 1, args.len()))?;
            let mut acc = init;
            for item in list_or_empty(&receiver)? {
                acc = ev.call_lambda(lambda, &[acc, item.clone()], scope)?;
            }
            Ok(acc)
        }
        "Upper" => Ok(Value::Str(as_str(&receiver, "Upper")?.to_uppercase())),
        "Lower" => Ok(Value::Str(as_str(&receiver, "Lower")?.to_lowercase())),
        "Trim" => Ok(Value::Str(as_str(&receiver, "Trim")?.trim().to_string())),
        "StartsWith" => {
            let s = as_str(&receiver, "StartsWith")?;
            let prefix = as_str(args.first().ok_or_else(|| arity_err("StartsWith", 1, args.len()))?, "StartsWith")?;
            Ok(Value::Bool(s.starts_with(&prefix)))
        }
        "EndsWith" => {
            let s = as_str(&receiver, "EndsWith")?;
            let suffix = as_str(args.first().ok_or_else(|| arity_err("EndsWith", 1, args.len()))?, "EndsWith")?;
            Ok(Value::Bool(s.ends_with(&suffix)))
        }
        "Substring" => {
            let s = as_str(&receiver, "Substring")?;
            let i = as_i64(args.first().ok_or_else(|| arity_err("Substring", 2, args.len()))?)?;
            let j = as_i64(args.get(1).ok_or_else(|| arity_err("Substring", 2, args.len()))?)?;
            let chars: Vec<char> = s.chars().collect();
            let (a, b) = clamp_range(i, j, chars.len());
            Ok(Value::Str(chars[a..b].iter().collect()))
        }
        "Match" => {
            let s = as_str(&receiver, "Match")?;
            let re_val = args.first().ok_or_else(|| arity_err("Match", 1, args.len()))?;
            let matched = ev.regex_match(&Value::Str(s), re_val)?;
            Ok(Value::Bool(matched))
        }
        "Replace" => {
            let s = as_str(&receiver, "Replace")?;
            let from = as_str(args.first().ok_or_else(|| arity_err("Replace", 2, args.len()))?, "Replace")?;
            let to = as_str(args.get(1).ok_or_else(|| arity_err("Replace", 2, args.len()))?, "Replace")?;
            Ok(Value::Str(s.replace(&from, &to)))
        }
        "TrimPrefix" => {
            let s = as_str(&receiver, "TrimPrefix")?;
            let prefix = as_str(args.first().ok_or_else(|| arity_err("TrimPrefix", 1, args.len()))?, "TrimPrefix")?;
            Ok(Value::Str(s.strip_prefix(&prefix).unwrap_or(&s).to_string()))
        }
        "TrimSuffix" => {
            let s = as_str(&receiver, "TrimSuffix")?;
            let suffix = as_str(args.first().ok_or_else(|| arity_err("TrimSuffix", 1, args.len()))?, "TrimSuffix")?;
            Ok(Value::Str(s.strip_suffix(&suffix).unwrap_or(&s).to_string()))
        }
        "Abs" => match receiver {
            Value::Int(i) => Ok(Value::Int(i.abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(EvalError::TypeMismatch(format!("Abs requires a number, found {}", other.type_name()))),
        },
        "Floor" => Ok(Value::Float(as_f64(&receiver)?.floor())),
        "Ceil" => Ok(Value::Float(as_f64(&receiver)?.ceil())),
        "Round" => Ok(Value::Float(round_half_to_even(as_f64(&receiver)?))),
        "Min" | "Max" => {
            if args.is_empty() {
                let items = list_or_empty(&receiver)?;
                if items.is_empty() {
                    return Ok(Value::Nil);
                }
                let mut best = items[0].clone();
                for item in &items[1..] {
                    let ord = compare(item, &best)?;
                    if (name == "Min" && ord.is_lt()) || (name == "Max" && ord.is_gt()) {
                        best = item.clone();
                    }
                }
                Ok(best)
            } else {
                let other = &args[0];
                let ord = compare(&receiver, other)?;
                let pick_receiver = (name == "Min" && ord.is_le()) || (name == "Max" && ord.is_ge());
                Ok(if pick_receiver { receiver } else { other.clone() })
            }
        }
        "Compare" => {
            let other = args.first().ok_or_else(|| arity_err("Compare", 1, args.len()))?;
            let ord = compare(&receiver, other)?;
            Ok(Value::Int(match ord {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            }))
        }
        "Default" => {
            let fallback = args.first().ok_or_else(|| arity_err("Default", 1, args.len()))?;
            Ok(if receiver.is_nil() { fallback.clone() } else { receiver })
        }
        "Coalesce" => {
            let b = args.first().ok_or_else(|| arity_err("Coalesce", 1, args.len()))?;
            Ok(if receiver.is_nil() { b.clone() } else { receiver })
        }
        "Then" => {
            let lambda = lambda.ok_or_else(|| lambda_required("Then"))?;
            if receiver.is_nil() {
                Ok(Value::Nil)
            } else {
                ev.call_lambda(lambda, &[receiver], scope)
            }
        }
        "Lest" => {
            let lambda = lambda.ok_or_else(|| lambda_required("Lest"))?;
            if receiver.is_nil() {
                ev.call_lambda(lambda, &[receiver], scope)
            } else {
                Ok(receiver)
            }
        }
        "With" => {
            let lambda = lambda.ok_or_else(|| lambda_required("With"))?;
            ev.call_lambda(lambda, &[receiver], scope)
        }
        "IsNil" => Ok(Value::Bool(receiver.is_nil())),
        "TypeOf" => Ok(Value::Str(receiver.type_name().to_string())),
        other => Err(EvalError::UnknownBuiltin(other.to_string())),
    }
}

fn list_or_empty(v: &Value) -> std::result::Result<&[Value], EvalError> {
    v.as_list_or_empty()
        .ok_or_else(|| EvalError::TypeMismatch(format!("expected a list, found {}", v.type_name())))
}

fn as_str(v: &Value, builtin: &str) -> std::result::Result<String, EvalError> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        other => Err(EvalError::TypeMismatch(format!(
            "{builtin} requires a string, found {}",
            other.type_name()
        ))),
    }
}

fn as_i64(v: &Value) -> std::result::Result<i64, EvalError> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(EvalError::TypeMismatch(format!("expected an integer, found {}", other.type_name()))),
    }
}

fn as_f64(v: &Value) -> std::result::Result<f64, EvalError> {
    as_number(v)
        .map(|n| to_f64(&n))
        .ok_or_else(|| EvalError::TypeMismatch(format!("expected a number, found {}", v.type_name())))
}

fn arity_err(name: &str, expected: usize, found: usize) -> EvalError {
    EvalError::BuiltinMisuse(name.to_string(), format!("expected {expected} argument(s), found {found}"))
}

fn lambda_required(name: &str) -> EvalError {
    EvalError::BuiltinMisuse(name.to_string(), "requires a trailing lambda".to_string())
}

/// Round-half-to-even ("banker's rounding"),.6
/// `Round`. Implemented by hand since `f64::round_ties_even` postdates this
/// crate's minimum supported Rust version.
fn round_half_to_even(x: f64) -> f64 {
    let floor = x.floor();
    let diff = x - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp as B, Expr as E, Literal as L, Span};
    use crate::source::{Position, SourceId};
    use std::collections::BTreeMap as Map;

    fn sp() -> Span {
        Span::point(SourceId::new("t"), Position::default())
    }

    fn props(pairs: &[(&str, Value)]) -> Properties {
        let mut m = Map::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        Properties::new(m)
    }

    #[test]
    fn nil_interchange_underscore_and_nil_literal() {
        let e1 = E::Literal(L::Nil, sp());
        let p = props(&[]);
        assert_eq!(evaluate(&e1, &p).unwrap(), Value::Nil);
    }

    #[test]
    fn integer_arithmetic_and_division_by_zero() {
        let p = props(&[]);
        let add = E::Binary(B::Add, Box::new(E::Literal(L::Int(2), sp())), Box::new(E::Literal(L::Int(3), sp())), sp());
        assert_eq!(evaluate(&add, &p).unwrap(), Value::Int(5));

        let div0 = E::Binary(B::Div, Box::new(E::Literal(L::Int(1), sp())), Box::new(E::Literal(L::Int(0), sp())), sp());
        assert!(matches!(evaluate(&div0, &p), Err(EvalError::DivisionByZero)));
    }

    #[test]
    fn string_plus_number_is_error() {
        let p = props(&[]);
        let e = E::Binary(
            B::Add,
            Box::new(E::Literal(L::Str("a".into()), sp())),
            Box::new(E::Literal(L::Int(1), sp())),
            sp(),
        );
        assert!(matches!(evaluate(&e, &p), Err(EvalError::TypeMismatch(_))));
    }

    #[test]
    fn bare_identifier_looks_up_self_property() {
        let p = props(&[("age", Value::Int(25))]);
        let e = E::Binary(
            B::Ge,
            Box::new(E::Var("age".into(), sp())),
            Box::new(E::Literal(L::Int(18), sp())),
            sp(),
        );
        assert_eq!(evaluate(&e, &p).unwrap(), Value::Bool(true));
    }

    #[test]
    fn undefined_variable_errors() {
        let p = props(&[]);
        let e = E::Var("missing".into(), sp());
        assert!(matches!(evaluate(&e, &p), Err(EvalError::UndefinedVariable(_))));
    }

    #[test]
    fn pipeline_all_vacuously_true_on_nil_tags() {
        let p = props(&[("tags", Value::Nil)]);
        let lambda = Lambda {
            params: vec!["t".to_string()],
            body: Box::new(E::Binary(
                B::Gt,
                Box::new(E::Pipeline(PipelineCall {
                    receiver: Box::new(E::Var("t".into(), sp())),
                    function: "Len".to_string(),
                    args: vec![],
                    lambda: None,
                    span: sp(),
                })),
                Box::new(E::Literal(L::Int(0), sp())),
                sp(),
            )),
            span: sp(),
        };
        let expr = E::Pipeline(PipelineCall {
            receiver: Box::new(E::Var("tags".into(), sp())),
            function: "All".to_string(),
            args: vec![],
            lambda: Some(lambda),
            span: sp(),
        });
        assert_eq!(evaluate(&expr, &p).unwrap(), Value::Bool(true));
    }

    #[test]
    fn pipeline_all_fails_on_empty_string_tag() {
        let p = props(&[(
            "tags",
            Value::List(vec![Value::Str("".into()), Value::Str("ok".into())]),
        )]);
        let lambda = Lambda {
            params: vec!["t".to_string()],
            body: Box::new(E::Binary(
                B::Gt,
                Box::new(E::Pipeline(PipelineCall {
                    receiver: Box::new(E::Var("t".into(), sp())),
                    function: "Len".to_string(),
                    args: vec![],
                    lambda: None,
                    span: sp(),
                })),
                Box::new(E::Literal(L::Int(0), sp())),
                sp(),
            )),
            span: sp(),
        };
        let expr = E::Pipeline(PipelineCall {
            receiver: Box::new(E::Var("tags".into(), sp())),
            function: "All".to_string(),
            args: vec![],
            lambda: Some(lambda),
            span: sp(),
        });
        assert_eq!(evaluate(&expr, &p).unwrap(), Value::Bool(false));
    }

    #[test]
    fn any_on_empty_list_is_false() {
        let p = props(&[]);
        let lambda = Lambda {
            params: vec!["x".to_string()],
            body: Box::new(E::Literal(L::Bool(true), sp())),
            span: sp(),
        };
        let expr = E::Pipeline(PipelineCall {
            receiver: Box::new(E::Literal(L::List(vec![]), sp())),
            function: "Any".to_string(),
            args: vec![],
            lambda: Some(lambda),
            span: sp(),
        });
        assert_eq!(evaluate(&expr, &p).unwrap(), Value::Bool(false));
    }

    #[test]
    fn sort_then_sort_is_idempotent() {
        let p = props(&[]);
        let list = E::Literal(L::List(vec![E::Literal(L::Int(3), sp()), E::Literal(L::Int(1), sp()), E::Literal(L::Int(2), sp())]), sp());
        let sorted_once = E::Pipeline(PipelineCall {
            receiver: Box::new(list),
            function: "Sort".to_string(),
            args: vec![],
            lambda: None,
            span: sp(),
        });
        let once = evaluate(&sorted_once, &p).unwrap();
        let Value::List(items) = &once else { panic!() };
        assert_eq!(items, &vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn reverse_reverse_is_identity() {
        let p = props(&[]);
        let items = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
        let list_expr = |v: Vec<Value>| {
            E::Literal(
                L::List(v.into_iter().map(|x| match x {
                    Value::Int(i) => E::Literal(L::Int(i), sp()),
                    _ => unreachable!(),
                }).collect()),
                sp(),
            )
        };
        let once = E::Pipeline(PipelineCall {
            receiver: Box::new(list_expr(items.clone())),
            function: "Reverse".to_string(),
            args: vec![],
            lambda: None,
            span: sp(),
        });
        let once_val = evaluate(&once, &p).unwrap();
        let Value::List(once_items) = once_val else { panic!() };
        assert_eq!(once_items, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn round_half_to_even_banker_rounding() {
        assert_eq!(round_half_to_even(0.5), 0.0);
        assert_eq!(round_half_to_even(1.5), 2.0);
        assert_eq!(round_half_to_even(2.5), 2.0);
    }

    #[test]
    fn regex_match_on_self_property() {
        let p = props(&[("code", Value::Str("ABC".into()))]);
        let e = E::Match {
            subject: Box::new(E::Var("code".into(), sp())),
            rhs: MatchRhs::Regex(Box::new(E::Literal(
                L::Regex { pattern: "^[A-Z]+$".into(), flags: "".into() },
                sp(),
            ))),
            negated: false,
            span: sp(),
        };
        assert_eq!(evaluate(&e, &p).unwrap(), Value::Bool(true));
    }

    #[test]
    fn datatype_keyword_match() {
        let p = props(&[("n", Value::Int(5))]);
        let e = E::Match {
            subject: Box::new(E::Var("n".into(), sp())),
            rhs: MatchRhs::Datatype(DatatypeKeyword::Integer),
            negated: false,
            span: sp(),
        };
        assert_eq!(evaluate(&e, &p).unwrap(), Value::Bool(true));
    }

    #[test]
    fn negative_index_errors_but_out_of_range_is_nil() {
        let p = props(&[]);
        let list = E::Literal(L::List(vec![E::Literal(L::Int(1), sp())]), sp());
        let neg = E::Index(Box::new(list.clone()), Box::new(E::Literal(L::Int(-1), sp())), sp());
        assert!(matches!(evaluate(&neg, &p), Err(EvalError::BadIndex(_))));

        let oob = E::Index(Box::new(list), Box::new(E::Literal(L::Int(5), sp())), sp());
        assert_eq!(evaluate(&oob, &p).unwrap(), Value::Nil);
    }
}
