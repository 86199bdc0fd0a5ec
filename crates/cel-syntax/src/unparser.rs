//! CEL expression unparser (AST to source text).
//!
//! The output parses back to an equivalent AST but may differ in formatting
//! (whitespace, parenthesization, quoting). Macro expansions are written back
//! as the macro call: from the recorded calls when the AST was parsed with
//! macro calls populated, otherwise by recognising the standard
//! comprehension shapes.
//!
//! # Example
//!
//! ```
//! use cel_syntax::{parse, unparse};
//!
//! let ast = parse("x + 1").unwrap().ast.unwrap();
//! assert_eq!(unparse(&ast), "x + 1");
//! ```

use crate::ast::{Ast, Comprehension, Constant, Entry, EntryKey, Expr, ExprKind};
use crate::macros::ACCU_VAR;
use crate::operators;
use crate::source::SourceInfo;

/// Convert an AST back to CEL source text.
pub fn unparse(ast: &Ast) -> String {
    Unparser {
        info: &ast.source_info,
    }
    .expr(&ast.root)
}

struct Unparser<'a> {
    info: &'a SourceInfo,
}

impl Unparser<'_> {
    fn expr(&self, expr: &Expr) -> String {
        if let Some(call) = self.info.macro_call(expr.id) {
            return self.expr(call);
        }

        match &expr.kind {
            ExprKind::Unspecified => "<error>".to_string(),
            ExprKind::Const(value) => constant(value),
            ExprKind::Ident(name) => name.clone(),
            ExprKind::Select {
                operand,
                field,
                test_only: true,
            } => format!("has({}.{})", self.operand(operand), field_name(field)),
            ExprKind::Select { operand, field, .. } => {
                format!("{}.{}", self.operand(operand), field_name(field))
            }
            ExprKind::Call {
                function,
                target,
                args,
            } => self.call(function, target.as_deref(), args),
            ExprKind::CreateList {
                elements,
                optional_indices,
            } => {
                let items: Vec<String> = elements
                    .iter()
                    .enumerate()
                    .map(|(i, e)| {
                        let marker = if optional_indices.contains(&i) { "?" } else { "" };
                        format!("{marker}{}", self.expr(e))
                    })
                    .collect();
                format!("[{}]", items.join(", "))
            }
            ExprKind::CreateStruct {
                message_name,
                entries,
            } => format!("{message_name}{{{}}}", self.entries(entries)),
            ExprKind::Comprehension(comp) => self.comprehension(comp),
        }
    }

    fn entries(&self, entries: &[Entry]) -> String {
        entries
            .iter()
            .map(|entry| {
                let marker = if entry.optional { "?" } else { "" };
                let key = match &entry.key {
                    EntryKey::Map(key) => self.expr(key),
                    EntryKey::Field(name) => field_name(name),
                };
                format!("{marker}{key}: {}", self.expr(&entry.value))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn args(&self, args: &[Expr]) -> String {
        args.iter()
            .map(|a| self.expr(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Unparse an operand of member access, index or a prefix operator.
    fn operand(&self, expr: &Expr) -> String {
        if self.is_operator(expr) || is_negative_number(expr) {
            format!("({})", self.expr(expr))
        } else {
            self.expr(expr)
        }
    }

    fn is_operator(&self, expr: &Expr) -> bool {
        self.info.macro_call(expr.id).is_none() && operator_precedence(expr).is_some()
    }

    fn call(&self, function: &str, target: Option<&Expr>, args: &[Expr]) -> String {
        if let Some(target) = target {
            return format!("{}.{}({})", self.operand(target), function, self.args(args));
        }

        match (function, args) {
            (operators::CONDITIONAL, [cond, then, otherwise]) => {
                let cond = self.side(cond, operators::CONDITIONAL, false);
                let then = self.side(then, operators::CONDITIONAL, false);
                format!("{cond} ? {then} : {}", self.expr(otherwise))
            }
            (operators::INDEX, [operand, index]) => {
                format!("{}[{}]", self.operand(operand), self.expr(index))
            }
            (operators::OPT_INDEX, [operand, index]) => {
                format!("{}[?{}]", self.operand(operand), self.expr(index))
            }
            (
                operators::OPT_SELECT,
                [operand, Expr {
                    kind: ExprKind::Const(Constant::String(field)),
                    ..
                }],
            ) => format!("{}.?{}", self.operand(operand), field_name(field)),
            _ => self.operator(function, args),
        }
    }

    fn operator(&self, function: &str, args: &[Expr]) -> String {
        match (operators::unary_symbol(function), operators::binary_symbol(function), args) {
            (Some(symbol), _, [operand]) => {
                let operand = self.operand(operand);
                // A repeated prefix would read back as a cancelling run.
                if operand.starts_with(symbol) {
                    format!("{symbol}({operand})")
                } else {
                    format!("{symbol}{operand}")
                }
            }
            (_, Some(symbol), [lhs, rhs]) => {
                let lhs = self.side(lhs, function, false);
                let rhs = self.side(rhs, function, true);
                format!("{lhs} {symbol} {rhs}")
            }
            _ => format!("{function}({})", self.args(args)),
        }
    }

    /// Unparse one side of an infix operator, parenthesized when it binds
    /// more loosely than the operator (or equally, on the right of a
    /// left-associative one).
    fn side(&self, expr: &Expr, parent: &str, right: bool) -> String {
        let (Some(prec), Some(parent_prec)) = (
            operator_precedence(expr).filter(|_| self.is_operator(expr)),
            operators::precedence(parent),
        ) else {
            return self.expr(expr);
        };
        let left_recursive = !matches!(
            parent,
            operators::LOGICAL_AND | operators::LOGICAL_OR | operators::CONDITIONAL
        );
        if prec < parent_prec
            || (parent == operators::CONDITIONAL && prec == parent_prec)
            || (right && left_recursive && prec == parent_prec)
        {
            format!("({})", self.expr(expr))
        } else {
            self.expr(expr)
        }
    }

    /// Recognise the standard macro expansions.
    fn comprehension(&self, comp: &Comprehension) -> String {
        if comp.accu_var == ACCU_VAR {
            if let Some(source) = self.sugar(comp) {
                return source;
            }
        }

        let vars = match &comp.iter_var2 {
            Some(var2) => format!("{}, {var2}", comp.iter_var),
            None => comp.iter_var.clone(),
        };
        format!(
            "__comprehension__({}, {vars}, {}, {}, {}, {}, {})",
            self.expr(&comp.iter_range),
            comp.accu_var,
            self.expr(&comp.accu_init),
            self.expr(&comp.loop_condition),
            self.expr(&comp.loop_step),
            self.expr(&comp.result)
        )
    }

    fn sugar(&self, comp: &Comprehension) -> Option<String> {
        let range = self.operand(&comp.iter_range);
        let vars = match &comp.iter_var2 {
            Some(var2) => format!("{}, {var2}", comp.iter_var),
            None => comp.iter_var.clone(),
        };
        let is_accu = |e: &Expr| e.as_ident() == Some(ACCU_VAR);

        match (&comp.accu_init.kind, call_parts(&comp.loop_step)) {
            // all / exists
            (ExprKind::Const(Constant::Bool(init)), Some((function, [accu, predicate])))
                if is_accu(accu) && is_accu(&comp.result) =>
            {
                let name = match (*init, function) {
                    (true, operators::LOGICAL_AND) => "all",
                    (false, operators::LOGICAL_OR) => "exists",
                    _ => return None,
                };
                Some(format!("{range}.{name}({vars}, {})", self.expr(predicate)))
            }
            // exists_one
            (
                ExprKind::Const(Constant::Int(0)),
                Some((operators::CONDITIONAL, [predicate, _, unchanged])),
            ) if is_accu(unchanged)
                && matches!(call_parts(&comp.result), Some((operators::EQUALS, [accu, _])) if is_accu(accu)) =>
            {
                Some(format!("{range}.exists_one({vars}, {})", self.expr(predicate)))
            }
            // map / filter / transformList
            (ExprKind::CreateList { elements, .. }, step) if elements.is_empty() && is_accu(&comp.result) => {
                let (filter, append) = match step {
                    Some((operators::CONDITIONAL, [filter, append, unchanged])) if is_accu(unchanged) => {
                        (Some(filter), append)
                    }
                    _ => (None, &comp.loop_step),
                };
                let Some((operators::ADD, [accu, appended])) = call_parts(append) else {
                    return None;
                };
                let ExprKind::CreateList { elements, .. } = &appended.kind else {
                    return None;
                };
                let ([element], true) = (elements.as_slice(), is_accu(accu)) else {
                    return None;
                };

                let name = if comp.iter_var2.is_some() { "transformList" } else { "map" };
                Some(match filter {
                    Some(filter)
                        if comp.iter_var2.is_none()
                            && element.as_ident() == Some(comp.iter_var.as_str()) =>
                    {
                        format!("{range}.filter({vars}, {})", self.expr(filter))
                    }
                    Some(filter) => format!(
                        "{range}.{name}({vars}, {}, {})",
                        self.expr(filter),
                        self.expr(element)
                    ),
                    None => format!("{range}.{name}({vars}, {})", self.expr(element)),
                })
            }
            // transformMap
            (ExprKind::CreateStruct { entries, .. }, step) if entries.is_empty() && is_accu(&comp.result) => {
                let (filter, insert) = match step {
                    Some((operators::CONDITIONAL, [filter, insert, unchanged])) if is_accu(unchanged) => {
                        (Some(filter), insert)
                    }
                    _ => (None, &comp.loop_step),
                };
                let Some((operators::MAP_INSERT, [_, _, value])) = call_parts(insert) else {
                    return None;
                };
                Some(match filter {
                    Some(filter) => format!(
                        "{range}.transformMap({vars}, {}, {})",
                        self.expr(filter),
                        self.expr(value)
                    ),
                    None => format!("{range}.transformMap({vars}, {})", self.expr(value)),
                })
            }
            _ => None,
        }
    }
}

/// Function name and arguments of a global call.
fn call_parts(expr: &Expr) -> Option<(&str, &[Expr])> {
    match &expr.kind {
        ExprKind::Call {
            function,
            target: None,
            args,
        } => Some((function.as_str(), args.as_slice())),
        _ => None,
    }
}

/// Precedence of an operator call with the right number of operands.
fn operator_precedence(expr: &Expr) -> Option<u8> {
    let (function, args) = call_parts(expr)?;
    let arity_matches = match args.len() {
        1 => operators::unary_symbol(function).is_some(),
        2 => operators::binary_symbol(function).is_some(),
        3 => function == operators::CONDITIONAL,
        _ => false,
    };
    if arity_matches {
        operators::precedence(function)
    } else {
        None
    }
}

fn is_negative_number(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Const(Constant::Int(n)) => *n < 0,
        ExprKind::Const(Constant::Double(f)) => f.is_sign_negative(),
        _ => false,
    }
}

fn constant(value: &Constant) -> String {
    match value {
        Constant::Null => "null".to_string(),
        Constant::Bool(b) => b.to_string(),
        Constant::Int(n) => n.to_string(),
        Constant::Uint(n) => format!("{n}u"),
        Constant::Double(f) => format_float(*f),
        Constant::String(s) => format!("\"{}\"", escape_string(s)),
        Constant::Bytes(b) => format!("b\"{}\"", escape_bytes(b)),
    }
}

/// Field names that are not plain identifiers need backticks.
fn field_name(name: &str) -> String {
    let mut chars = name.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{name}`")
    }
}

/// Format a float, ensuring it always has a decimal point or exponent.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "double(\"NaN\")".to_string();
    }
    if f.is_infinite() {
        return if f.is_sign_positive() {
            "double(\"Infinity\")".to_string()
        } else {
            "double(\"-Infinity\")".to_string()
        };
    }

    let s = f.to_string();
    if s.contains(['.', 'e', 'E']) {
        s
    } else {
        format!("{s}.0")
    }
}

fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => result.push_str(&format!("\\u{:04x}", c as u32)),
            c => result.push(c),
        }
    }
    result
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut result = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        match b {
            b'\\' => result.push_str("\\\\"),
            b'"' => result.push_str("\\\""),
            b'\n' => result.push_str("\\n"),
            b'\r' => result.push_str("\\r"),
            b'\t' => result.push_str("\\t"),
            b if b.is_ascii_graphic() || b == b' ' => result.push(b as char),
            b => result.push_str(&format!("\\x{b:02x}")),
        }
    }
    result
}
