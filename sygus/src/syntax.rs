// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The AST for terms, function definitions and signatures.

use itertools::Itertools;
use serde::Serialize;
use std::{collections::BTreeSet, fmt};

use crate::printer;

/// A Sort represents a collection of values: the built-in booleans or the
/// mathematical integers.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize, PartialOrd, Ord)]
pub enum Sort {
    /// Boolean sort
    Bool,
    /// Integer sort
    Int,
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sort::Bool => "Bool",
            Sort::Int => "Int",
        };
        write!(f, "{s}")
    }
}

/// A binder is a variable name and a sort (used for function parameters)
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize, PartialOrd, Ord)]
pub struct Binder {
    /// Bound name
    pub name: String,
    /// Sort for this binder
    pub sort: Sort,
}

impl Binder {
    /// Smart constructor for a Binder that takes arguments by reference.
    pub fn new(name: &str, sort: Sort) -> Self {
        Binder {
            name: name.to_string(),
            sort,
        }
    }
}

/// Unary operators
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum UOp {
    /// Boolean negation
    Not,
    /// Integer negation
    Neg,
}

/// Binary operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum BinOp {
    Equals,
    Implies,
}

/// N-ary logical operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum NOp {
    And,
    Or,
}

/// Binary integer operations
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum NumOp {
    Add,
    Sub,
    Mul,
}

/// Integer comparisons
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, PartialOrd, Ord)]
pub enum NumRel {
    Lt,
    Leq,
    Geq,
    Gt,
}

/// A quantifier-free term or formula over booleans and integers.
///
/// Terms are immutable values compared structurally. Variables of the
/// next state of a transition system are ordinary identifiers whose names end
/// in a prime (see [`crate::subst::prime_name`]).
#[derive(PartialEq, Eq, Clone, Debug, Hash, PartialOrd, Ord)]
pub enum Term {
    /// A constant true or false
    Literal(bool),
    /// An integer constant
    Int(i64),
    /// A reference to a variable
    Id(String),
    /// Application of a defined (or to-be-synthesized) function
    App(String, Vec<Term>),
    /// An applied unary operation
    UnaryOp(UOp, Box<Term>),
    /// An applied binary operation
    BinOp(BinOp, Box<Term>, Box<Term>),
    /// An applied n-ary operation
    NAryOp(NOp, Vec<Term>),
    /// An applied integer operation
    NumOp(NumOp, Box<Term>, Box<Term>),
    /// An integer comparison
    NumRel(NumRel, Box<Term>, Box<Term>),
    /// If-then-else
    Ite {
        /// A boolean conditional
        cond: Box<Term>,
        /// Value of the Ite when `cond` is true
        then: Box<Term>,
        /// Value of the Ite when `cond` is false
        else_: Box<Term>,
    },
}

impl From<&Term> for Term {
    fn from(value: &Self) -> Self {
        value.clone()
    }
}

/// Smart constructors for Term. These generally take arguments by reference and
/// clone them.
impl Term {
    /// Smart constructor for Literal(true)
    pub fn true_() -> Self {
        Self::Literal(true)
    }

    /// Smart constructor for Literal(false)
    pub fn false_() -> Self {
        Self::Literal(false)
    }

    /// Smart constructor for an integer constant
    pub fn int(value: i64) -> Self {
        Self::Int(value)
    }

    /// Smart constructor for Id
    pub fn id(name: &str) -> Self {
        Self::Id(name.to_string())
    }

    /// Smart constructor for function application
    pub fn app<I>(f: &str, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Term>,
    {
        Self::App(f.to_string(), args.into_iter().map(|x| x.into()).collect())
    }

    /// Smart constructor for not. Unlike the n-ary constructors this does no
    /// simplification, so the term keeps the shape it was built with.
    pub fn not<T>(t: T) -> Self
    where
        T: Into<Term>,
    {
        Self::UnaryOp(UOp::Not, Box::new(t.into()))
    }

    /// Smart constructor for integer negation
    pub fn neg<T>(t: T) -> Self
    where
        T: Into<Term>,
    {
        Self::UnaryOp(UOp::Neg, Box::new(t.into()))
    }

    /// Smart constructor for `lhs = rhs`
    pub fn equals<T1, T2>(lhs: T1, rhs: T2) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
    {
        Self::BinOp(BinOp::Equals, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// Smart constructor for `lhs => rhs`
    pub fn implies<T1, T2>(lhs: T1, rhs: T2) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
    {
        Self::BinOp(BinOp::Implies, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// Helper function for [`Self::and`] and [`Self::or`]
    fn flatten_terms_of_op(ts: Vec<Term>, op: NOp) -> Vec<Term> {
        ts.into_iter()
            .flat_map(|t| match t {
                Self::NAryOp(op2, ts2) if op == op2 => ts2,
                _ => vec![t],
            })
            .collect()
    }

    /// Smart constructor for And. Zero and one conjuncts are handled specially, and
    /// conjuncts that are And are flattened (but not recursively).
    pub fn and<I>(ts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Term>,
    {
        let mut ts = ts.into_iter().map(|x| x.into()).collect_vec();
        if ts.is_empty() {
            Self::true_()
        } else if ts.len() == 1 {
            return ts.pop().unwrap();
        } else {
            Self::NAryOp(NOp::And, Self::flatten_terms_of_op(ts, NOp::And))
        }
    }

    /// Smart constructor for Or. Zero and one disjuncts are handled specially,
    /// and disjuncts that are Or are flattened (but not recursively).
    pub fn or<I>(ts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Term>,
    {
        let mut ts = ts.into_iter().map(|x| x.into()).collect_vec();
        if ts.is_empty() {
            Self::false_()
        } else if ts.len() == 1 {
            return ts.pop().unwrap();
        } else {
            Self::NAryOp(NOp::Or, Self::flatten_terms_of_op(ts, NOp::Or))
        }
    }

    /// Smart constructor for an integer operation
    pub fn num_op<T1, T2>(op: NumOp, lhs: T1, rhs: T2) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
    {
        Self::NumOp(op, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// Smart constructor for an integer comparison
    pub fn num_rel<T1, T2>(rel: NumRel, lhs: T1, rhs: T2) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
    {
        Self::NumRel(rel, Box::new(lhs.into()), Box::new(rhs.into()))
    }

    /// Smart constructor for if-then-else
    pub fn ite<T1, T2, T3>(cond: T1, then: T2, else_: T3) -> Self
    where
        T1: Into<Term>,
        T2: Into<Term>,
        T3: Into<Term>,
    {
        Self::Ite {
            cond: Box::new(cond.into()),
            then: Box::new(then.into()),
            else_: Box::new(else_.into()),
        }
    }

    /// The immediate subterms of this term, left to right.
    pub fn children(&self) -> Vec<&Term> {
        match self {
            Term::Literal(_) | Term::Int(_) | Term::Id(_) => vec![],
            Term::App(_, args) | Term::NAryOp(_, args) => args.iter().collect(),
            Term::UnaryOp(_, t) => vec![t.as_ref()],
            Term::BinOp(_, lhs, rhs) | Term::NumOp(_, lhs, rhs) | Term::NumRel(_, lhs, rhs) => {
                vec![lhs.as_ref(), rhs.as_ref()]
            }
            Term::Ite { cond, then, else_ } => vec![cond.as_ref(), then.as_ref(), else_.as_ref()],
        }
    }

    /// The number of nodes in the syntax tree.
    pub fn size(&self) -> usize {
        1 + self.children().into_iter().map(Term::size).sum::<usize>()
    }

    /// The set of identifiers occurring in the term.
    pub fn ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut BTreeSet<String>) {
        if let Term::Id(name) = self {
            ids.insert(name.clone());
        }
        for t in self.children() {
            t.collect_ids(ids);
        }
    }

    /// The set of integer literals occurring in the term. `(- c)` with a
    /// literal `c` counts as the literal `-c`.
    pub fn int_literals(&self) -> BTreeSet<i64> {
        let mut lits = BTreeSet::new();
        self.collect_ints(&mut lits);
        lits
    }

    fn collect_ints(&self, lits: &mut BTreeSet<i64>) {
        match self {
            Term::Int(i) => {
                lits.insert(*i);
            }
            Term::UnaryOp(UOp::Neg, t) => match t.as_ref() {
                Term::Int(i) => {
                    if let Some(n) = i.checked_neg() {
                        lits.insert(n);
                    }
                }
                _ => t.collect_ints(lits),
            },
            _ => {
                for t in self.children() {
                    t.collect_ints(lits);
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", printer::term(self))
    }
}

/// A function definition, as given by `define-fun`.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct FunDef {
    /// The function's name
    pub name: String,
    /// Typed parameters, which are the free variables of the body
    pub params: Vec<Binder>,
    /// The sort of the body
    pub ret: Sort,
    /// The definition itself
    pub body: Term,
}

impl FunDef {
    /// The sorts of the parameters, in order.
    pub fn param_sorts(&self) -> Vec<Sort> {
        self.params.iter().map(|b| b.sort).collect()
    }

    /// The signature entry for this definition.
    pub fn decl(&self) -> FunDecl {
        FunDecl {
            name: self.name.clone(),
            params: self.param_sorts(),
            ret: self.ret,
        }
    }
}

impl fmt::Display for FunDef {
    /// Renders as `(define-fun <name> (<typed parameters>) <sort> <body>)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", printer::fun_def(self))
    }
}

/// The declared type of a function.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct FunDecl {
    #[allow(missing_docs)]
    pub name: String,
    /// Sorts of the arguments
    pub params: Vec<Sort>,
    /// Sort of the result
    pub ret: Sort,
}

/// The functions in scope, in declaration order.
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Signature {
    funs: Vec<FunDecl>,
}

impl Signature {
    /// Look up a function by name.
    pub fn fun(&self, name: &str) -> Option<&FunDecl> {
        self.funs.iter().find(|f| f.name == name)
    }

    /// Whether a function with this name has been declared.
    pub fn contains(&self, name: &str) -> bool {
        self.fun(name).is_some()
    }

    /// Add a function. The caller is responsible for checking the name is
    /// fresh.
    pub fn add(&mut self, decl: FunDecl) {
        self.funs.push(decl);
    }
}

#[cfg(test)]
mod tests {
    use super::{NOp, NumOp, NumRel, Term};

    #[test]
    fn test_size() {
        let x = Term::id("x");
        assert_eq!(x.size(), 1);
        let t = Term::num_rel(NumRel::Leq, &x, Term::int(10));
        assert_eq!(t.size(), 3);
        let t = Term::not(Term::and([t.clone(), Term::equals(&x, Term::int(0))]));
        assert_eq!(t.size(), 8);
    }

    #[test]
    fn test_and_flattens_one_level() {
        let (a, b, c) = (Term::id("a"), Term::id("b"), Term::id("c"));
        let t = Term::and([Term::and([&a, &b]), c.clone()]);
        assert_eq!(t, Term::NAryOp(NOp::And, vec![a.clone(), b, c]));
        assert_eq!(Term::and(Vec::<Term>::new()), Term::true_());
        assert_eq!(Term::or([&a]), a);
    }

    #[test]
    fn test_ids_and_literals() {
        let x = Term::id("x");
        let x_next = Term::id("x'");
        let t = Term::ite(
            Term::num_rel(NumRel::Lt, &x, Term::int(10)),
            Term::equals(&x_next, Term::num_op(NumOp::Add, &x, Term::int(1))),
            Term::equals(&x_next, Term::neg(Term::int(3))),
        );
        assert_eq!(
            t.ids().into_iter().collect::<Vec<_>>(),
            vec!["x".to_string(), "x'".to_string()]
        );
        assert_eq!(
            t.int_literals().into_iter().collect::<Vec<_>>(),
            vec![-3, 1, 10]
        );
    }
}
