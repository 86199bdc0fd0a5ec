//! Rebalancing of `||` and `&&` chains.
//!
//! A chain of n terms joined by the same logical operator becomes either a
//! binary tree of depth ceil(log2 n) or, when variadic ASTs are enabled, a
//! single call over all terms. Both operators are commutative for CEL's
//! error/unknown semantics, so the regrouping does not change the result.

use crate::ast::Expr;

/// Collects the terms of one logical chain and builds the final expression.
#[derive(Debug)]
pub struct LogicManager {
    function: &'static str,
    terms: Vec<Expr>,
    ops: Vec<i64>,
    variadic: bool,
}

impl LogicManager {
    /// Balanced-tree manager starting from the chain's first term.
    pub fn balanced(function: &'static str, first: Expr) -> Self {
        Self::new(function, first, false)
    }

    /// Manager producing one call over every term.
    pub fn variadic(function: &'static str, first: Expr) -> Self {
        Self::new(function, first, true)
    }

    pub fn new(function: &'static str, first: Expr, variadic: bool) -> Self {
        Self {
            function,
            terms: vec![first],
            ops: Vec::new(),
            variadic,
        }
    }

    /// Append a term together with the id of the operator preceding it.
    pub fn add_term(&mut self, op_id: i64, term: Expr) {
        self.ops.push(op_id);
        self.terms.push(term);
    }

    pub fn to_expr(self) -> Expr {
        let Self {
            function,
            terms,
            ops,
            variadic,
        } = self;
        match <[Expr; 1]>::try_from(terms) {
            Ok([single]) => single,
            Err(terms) if variadic => Expr::call(ops[0], function, terms),
            Err(terms) => balanced_tree(function, terms, &ops),
        }
    }
}

/// Split at the middle operator and recurse. Terms stay in source order, so
/// `terms.len() == ops.len() + 1` holds for every subtree.
fn balanced_tree(function: &'static str, mut terms: Vec<Expr>, ops: &[i64]) -> Expr {
    let mid = ops.len() / 2;
    let right_terms = terms.split_off(mid + 1);
    let left = subtree(function, terms, &ops[..mid]);
    let right = subtree(function, right_terms, &ops[mid + 1..]);
    Expr::call(ops[mid], function, vec![left, right])
}

fn subtree(function: &'static str, terms: Vec<Expr>, ops: &[i64]) -> Expr {
    match <[Expr; 1]>::try_from(terms) {
        Ok([single]) => single,
        Err(terms) => balanced_tree(function, terms, ops),
    }
}
