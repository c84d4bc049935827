use indexmap::IndexMap;

use super::{
    ast::{BinaryOp, Expr, Program, Stmt, UnaryOp},
    value::{Array, Key, Value},
};
use crate::error::{RenderError, RenderResult, RenderWarning};

/// Variables visible to a running program.
pub type Scope = IndexMap<String, Value>;

/// Everything a program needs from the outside world: somewhere to write
/// output, functions to call, and somewhere to send warnings.
pub trait Host {
    fn echo(&mut self, text: &str);

    /// Calls the function `name`. The scope is passed along for functions
    /// such as `defaults()` that read or write the caller's variables.
    ///
    /// # Errors
    /// - If no function of that name exists.
    /// - If the function itself fails.
    fn call(&mut self, name: &str, args: Vec<Value>, scope: &mut Scope) -> RenderResult<Value>;

    fn report(&mut self, warning: RenderWarning);

    /// Whether reading an undefined variable should be reported.
    fn notice_undefined(&self) -> bool {
        true
    }
}

/// Tree-walking executor for [`Program`]s.
pub struct Interpreter<'h, H: Host + ?Sized> {
    host: &'h mut H,
    line: Option<usize>,
}

impl<'h, H: Host + ?Sized> Interpreter<'h, H> {
    pub const fn new(host: &'h mut H) -> Self {
        Self { host, line: None }
    }

    /// Template line of the statement being executed.
    pub const fn line(&self) -> Option<usize> {
        self.line
    }

    /// Runs `program` against `scope`.
    ///
    /// # Errors
    /// Returns the first runtime error raised by the program or by a host
    /// function it calls.
    pub fn run(&mut self, program: &Program, scope: &mut Scope) -> RenderResult<()> {
        self.exec_all(&program.stmts, scope)
    }

    fn error(&self, message: impl Into<String>) -> RenderError {
        RenderError::Script {
            message: message.into(),
            line: self.line,
        }
    }

    fn exec_all(&mut self, stmts: &[Stmt], scope: &mut Scope) -> RenderResult<()> {
        for stmt in stmts {
            self.exec(stmt, scope)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt, scope: &mut Scope) -> RenderResult<()> {
        match stmt {
            Stmt::Line(line) => self.line = Some(*line),
            Stmt::Echo(exprs) => {
                for expr in exprs {
                    let value = self.eval(expr, scope)?;
                    self.host.echo(&value.to_string());
                }
            }
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            Stmt::Block(stmts) => self.exec_all(stmts, scope)?,
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.eval(condition, scope)?.is_truthy() {
                        return self.exec_all(body, scope);
                    }
                }
                if let Some(body) = otherwise {
                    self.exec_all(body, scope)?;
                }
            }
            Stmt::While { condition, body } => {
                while self.eval(condition, scope)?.is_truthy() {
                    self.exec_all(body, scope)?;
                }
            }
            Stmt::DoWhile { body, condition } => loop {
                self.exec_all(body, scope)?;
                if !self.eval(condition, scope)?.is_truthy() {
                    break;
                }
            },
            Stmt::For {
                init,
                condition,
                step,
                body,
            } => {
                for expr in init {
                    self.eval(expr, scope)?;
                }
                loop {
                    let mut proceed = true;
                    for expr in condition {
                        proceed = self.eval(expr, scope)?.is_truthy();
                    }
                    if !proceed {
                        break;
                    }
                    self.exec_all(body, scope)?;
                    for expr in step {
                        self.eval(expr, scope)?;
                    }
                }
            }
            Stmt::Foreach {
                source,
                key,
                value,
                body,
            } => self.exec_foreach(source, key.as_deref(), value, body, scope)?,
        }
        Ok(())
    }

    fn exec_foreach(
        &mut self,
        source: &Expr,
        key_var: Option<&str>,
        value_var: &str,
        body: &[Stmt],
        scope: &mut Scope,
    ) -> RenderResult<()> {
        let bind = |scope: &mut Scope, key: Key, value: Value| {
            if let Some(key_var) = key_var {
                scope.insert(key_var.to_string(), key.to_value());
            }
            scope.insert(value_var.to_string(), value);
        };

        match self.eval(source, scope)? {
            // Iterate a snapshot so the body may modify the source.
            Value::Array(items) => {
                for (key, value) in items {
                    bind(scope, key, value);
                    self.exec_all(body, scope)?;
                }
            }
            Value::Loop(tracker) => {
                let mut index = 0;
                while let Some((key, value)) = tracker.item(index) {
                    bind(scope, key, value);
                    self.exec_all(body, scope)?;
                    index += 1;
                }
            }
            Value::Null
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::Html(_) => self.host.report(RenderWarning::InvalidForeach),
        }
        Ok(())
    }

    // --- Expressions ---

    fn eval(&mut self, expr: &Expr, scope: &mut Scope) -> RenderResult<Value> {
        match expr {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Var(name) => Ok(self.read_var(name, scope)),
            Expr::Array(items) => {
                let mut array = Array::new();
                for (key, value) in items {
                    let key = match key {
                        Some(key) => Some(self.eval(key, scope)?.to_key()),
                        None => None,
                    };
                    let value = self.eval(value, scope)?;
                    let key = key.unwrap_or_else(|| next_index(&array));
                    array.insert(key, value);
                }
                Ok(Value::Array(array))
            }
            Expr::Index { base, index } => {
                let Some(index) = index else {
                    return Err(self.error("Cannot use [] for reading"));
                };
                let base = self.eval(base, scope)?;
                let key = self.eval(index, scope)?;
                Ok(self.read_index(&base, &key))
            }
            Expr::Prop { base, name } => {
                let base = self.eval(base, scope)?;
                Ok(self.read_prop(&base, name))
            }
            Expr::Call { name, args } => self.eval_call(name, args, scope),
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => arith(BinaryOp::Sub, &Value::Int(0), &value)
                        .map_err(|message| self.error(message)),
                    UnaryOp::Plus => Ok(value.to_number()),
                }
            }
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right, scope),
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.eval(condition, scope)?;
                if condition.is_truthy() {
                    match then {
                        Some(then) => self.eval(then, scope),
                        None => Ok(condition),
                    }
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Assign { target, op, value } => {
                let value = self.eval(value, scope)?;
                self.assign(target, *op, value, scope)
            }
            Expr::Step { target, delta } => self.step(target, *delta, scope),
        }
    }

    fn read_var(&mut self, name: &str, scope: &Scope) -> Value {
        if let Some(value) = scope.get(name) {
            return value.clone();
        }
        if self.host.notice_undefined() {
            self.host.report(RenderWarning::UndefinedVariable {
                name: name.to_string(),
            });
        }
        Value::Null
    }

    fn read_index(&mut self, base: &Value, key: &Value) -> Value {
        match base {
            Value::Array(array) => {
                let key = key.to_key();
                if let Some(value) = array.get(&key) {
                    return value.clone();
                }
                self.host
                    .report(RenderWarning::Notice(format!("Undefined array key \"{key}\"")));
                Value::Null
            }
            Value::Str(s) | Value::Html(s) => usize::try_from(key.to_int())
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map_or(Value::Null, |c| Value::Str(c.to_string())),
            Value::Null => Value::Null,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Loop(_) => {
                self.host.report(RenderWarning::Notice(format!(
                    "Trying to access array offset on value of type {}",
                    base.type_name()
                )));
                Value::Null
            }
        }
    }

    fn read_prop(&mut self, base: &Value, name: &str) -> Value {
        let found = match base {
            Value::Loop(tracker) => tracker.property(name),
            Value::Array(array) => array.get(&Key::from(name)).cloned(),
            _ => None,
        };
        found.unwrap_or_else(|| {
            self.host.report(RenderWarning::Notice(format!(
                "Undefined property {name} on {}",
                base.type_name()
            )));
            Value::Null
        })
    }

    /// Resolves an expression without reporting anything when it is unset.
    fn quiet(&mut self, expr: &Expr, scope: &mut Scope) -> RenderResult<Option<Value>> {
        let value = match expr {
            Expr::Var(name) => scope.get(name).cloned(),
            Expr::Index {
                base,
                index: Some(index),
            } => {
                let Some(base) = self.quiet(base, scope)? else {
                    return Ok(None);
                };
                let key = self.eval(index, scope)?.to_key();
                base.get(&key).cloned()
            }
            Expr::Prop { base, name } => match self.quiet(base, scope)? {
                Some(Value::Loop(tracker)) => tracker.property(name),
                Some(Value::Array(array)) => array.get(&Key::from(name.as_str())).cloned(),
                _ => None,
            },
            _ => Some(self.eval(expr, scope)?),
        };
        Ok(value.filter(|v| !v.is_null()))
    }

    fn eval_call(&mut self, name: &str, args: &[Expr], scope: &mut Scope) -> RenderResult<Value> {
        match name {
            "isset" => {
                for arg in args {
                    if self.quiet(arg, scope)?.is_none() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(!args.is_empty()))
            }
            "empty" => {
                let Some(arg) = args.first() else {
                    return Err(self.error("empty() expects exactly one argument"));
                };
                let value = self.quiet(arg, scope)?;
                Ok(Value::Bool(!value.is_some_and(|v| v.is_truthy())))
            }
            "get_defined_vars" => Ok(Value::Array(
                scope
                    .iter()
                    .map(|(k, v)| (Key::from(k.as_str()), v.clone()))
                    .collect(),
            )),
            _ => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, scope)?);
                }
                self.host
                    .call(name, values, scope)
                    .map_err(|error| error.with_line(self.line))
            }
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: &mut Scope,
    ) -> RenderResult<Value> {
        match op {
            BinaryOp::Or => {
                let result = self.eval(left, scope)?.is_truthy() || self.eval(right, scope)?.is_truthy();
                return Ok(Value::Bool(result));
            }
            BinaryOp::And => {
                let result = self.eval(left, scope)?.is_truthy() && self.eval(right, scope)?.is_truthy();
                return Ok(Value::Bool(result));
            }
            BinaryOp::Coalesce => {
                return match self.quiet(left, scope)? {
                    Some(value) => Ok(value),
                    None => self.eval(right, scope),
                };
            }
            _ => {}
        }

        let left = self.eval(left, scope)?;
        let right = self.eval(right, scope)?;
        binary(op, &left, &right).map_err(|message| self.error(message))
    }

    // --- Assignment ---

    fn assign(
        &mut self,
        target: &Expr,
        op: Option<BinaryOp>,
        value: Value,
        scope: &mut Scope,
    ) -> RenderResult<Value> {
        let (root, path) = self.lvalue_path(target, scope)?;
        if op.is_some() && !scope.contains_key(&root) {
            self.read_var(&root, scope);
        }
        let slot = self.slot(scope, root, &path)?;
        let value = match op {
            Some(op) => binary(op, slot, &value).map_err(|message| self.error(message))?,
            None => value,
        };
        *slot = value.clone();
        Ok(value)
    }

    fn step(&mut self, target: &Expr, delta: i64, scope: &mut Scope) -> RenderResult<Value> {
        let (root, path) = self.lvalue_path(target, scope)?;
        let slot = self.slot(scope, root, &path)?;
        let old = slot.clone();
        if !old.is_null() || delta > 0 {
            *slot = arith(BinaryOp::Add, &old, &Value::Int(delta))
                .map_err(|message| self.error(message))?;
        }
        Ok(old)
    }

    /// Splits an lvalue into its variable name and the evaluated keys below
    /// it. `None` keys stand for the append form `[]`.
    fn lvalue_path(
        &mut self,
        target: &Expr,
        scope: &mut Scope,
    ) -> RenderResult<(String, Vec<Option<Key>>)> {
        match target {
            Expr::Var(name) => Ok((name.clone(), Vec::new())),
            Expr::Index { base, index } => {
                let (root, mut path) = self.lvalue_path(base, scope)?;
                let key = match index {
                    Some(index) => Some(self.eval(index, scope)?.to_key()),
                    None => None,
                };
                path.push(key);
                Ok((root, path))
            }
            _ => Err(self.error("Cannot assign to this expression")),
        }
    }

    /// Walks `path` below `root`, creating arrays on the way.
    fn slot<'s>(
        &self,
        scope: &'s mut Scope,
        root: String,
        path: &[Option<Key>],
    ) -> RenderResult<&'s mut Value> {
        let mut slot = scope.entry(root).or_insert(Value::Null);
        for key in path {
            if matches!(slot, Value::Null) || matches!(slot, Value::Str(s) if s.is_empty()) {
                *slot = Value::Array(Array::new());
            }
            let type_name = slot.type_name();
            let Value::Array(array) = slot else {
                return Err(self.error(format!(
                    "Cannot use a scalar value of type {type_name} as an array"
                )));
            };
            let key = key.clone().unwrap_or_else(|| next_index(array));
            slot = array.entry(key).or_insert(Value::Null);
        }
        Ok(slot)
    }
}

/// Next integer key for an append, one past the largest integer key.
fn next_index(array: &Array) -> Key {
    let next = array
        .keys()
        .filter_map(|k| match k {
            Key::Int(i) => Some(*i),
            Key::Str(_) => None,
        })
        .max()
        .map_or(0, |max| max.saturating_add(1));
    Key::Int(next)
}

/// Non short-circuiting binary operators.
fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, String> {
    let value = match op {
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_eq(right)),
        BinaryOp::Identical => Value::Bool(left.strict_eq(right)),
        BinaryOp::NotIdentical => Value::Bool(!left.strict_eq(right)),
        BinaryOp::Lt => Value::Bool(left.compare(right).is_some_and(|o| o.is_lt())),
        BinaryOp::Gt => Value::Bool(left.compare(right).is_some_and(|o| o.is_gt())),
        BinaryOp::Le => Value::Bool(left.compare(right).is_some_and(|o| o.is_le())),
        BinaryOp::Ge => Value::Bool(left.compare(right).is_some_and(|o| o.is_ge())),
        BinaryOp::Concat => Value::Str(format!("{left}{right}")),
        BinaryOp::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
        BinaryOp::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        BinaryOp::Coalesce => {
            if left.is_null() {
                right.clone()
            } else {
                left.clone()
            }
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            return arith(op, left, right);
        }
    };
    Ok(value)
}

/// Arithmetic with integer overflow falling back to floats.
fn arith(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, String> {
    if let (BinaryOp::Add, Value::Array(a), Value::Array(b)) = (op, left, right) {
        let mut union = a.clone();
        for (key, value) in b {
            union.entry(key.clone()).or_insert_with(|| value.clone());
        }
        return Ok(Value::Array(union));
    }

    match (left.to_number(), right.to_number()) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => {
                    if b == 0 {
                        return Err("Division by zero".to_string());
                    }
                    match a.checked_rem(b) {
                        Some(0) => a.checked_div(b),
                        _ => None,
                    }
                }
                BinaryOp::Mod => {
                    if b == 0 {
                        return Err("Modulo by zero".to_string());
                    }
                    Some(a.checked_rem(b).unwrap_or(0))
                }
                _ => return Err(format!("Unsupported arithmetic operator {op:?}")),
            };
            match result {
                Some(i) => Ok(Value::Int(i)),
                None => float_arith(op, left.to_float(), right.to_float()),
            }
        }
        _ => float_arith(op, left.to_float(), right.to_float()),
    }
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> Result<Value, String> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return Err("Division by zero".to_string()),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => {
            let (a, b) = (Value::Float(a).to_int(), Value::Float(b).to_int());
            return arith(op, &Value::Int(a), &Value::Int(b));
        }
        _ => return Err(format!("Unsupported arithmetic operator {op:?}")),
    };
    Ok(Value::Float(result))
}
