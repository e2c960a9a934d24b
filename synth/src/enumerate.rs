// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Enumerate the terms of a grammar in order of size.
//!
//! Terms are produced by non-decreasing size. Within a size, derivations are
//! ordered by the rule used at the root, then by how the remaining size is
//! split among the rule's holes (lexicographically), then by the children
//! themselves with the rightmost child varying fastest. The size of a
//! derivation is the sum of its rules' weights (see
//! [`crate::grammar::Rule::weight`]).
//!
//! Each derivation is computed from the previous one. Besides the current
//! derivation, the enumerator keeps a table of which (nonterminal, size)
//! pairs derive any term at all, and the set of terms already produced at the
//! current size. An ambiguous grammar derives some terms more than once; a
//! term is only produced at its smallest derivation size, and only once
//! within that size. The set is cleared whenever the size advances, so it
//! holds at most one size class of terms.

use std::collections::{HashMap, HashSet};

use sygus::syntax::Term;

use crate::grammar::Grammar;

/// A derivation tree: the rule used at the root and the derivations of its
/// holes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Deriv {
    nt: usize,
    rule: usize,
    size: usize,
    children: Vec<Deriv>,
}

impl Deriv {
    fn child_sizes(&self) -> Vec<usize> {
        self.children.iter().map(|c| c.size).collect()
    }
}

/// A saved point in an enumeration, to continue from later with
/// [`Enumerator::resume`]. A position is only meaningful for the grammar it
/// was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    size: usize,
    current: Option<Deriv>,
    seen: HashSet<Term>,
}

impl Position {
    /// The size of the last term produced, or 0 before the first one.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A deterministic enumeration of the terms derivable from a grammar's start
/// symbol.
#[derive(Debug)]
pub struct Enumerator<'a> {
    grammar: &'a Grammar,
    limit: Option<usize>,
    size: usize,
    current: Option<Deriv>,
    inhabited: HashMap<(usize, usize), bool>,
    seen: HashSet<Term>,
    exhausted: bool,
}

impl<'a> Enumerator<'a> {
    /// Enumerate `grammar`, optionally only up to terms of size `max_size`.
    /// Finite grammars are bounded by their largest term regardless.
    pub fn new(grammar: &'a Grammar, max_size: Option<usize>) -> Self {
        let limit = match (max_size, grammar.max_size()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            grammar,
            limit,
            size: 0,
            current: None,
            inhabited: HashMap::new(),
            seen: HashSet::new(),
            exhausted: false,
        }
    }

    /// The largest size this enumeration will reach, if bounded.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Whether `nt` derives some term of exactly `size`.
    fn inhabited(&mut self, nt: usize, size: usize) -> bool {
        if size == 0 {
            return false;
        }
        if let Some(&b) = self.inhabited.get(&(nt, size)) {
            return b;
        }
        let g = self.grammar;
        let mut result = false;
        for rule in g.rules(nt) {
            let kids = rule.children();
            if kids.is_empty() {
                if size == rule.weight() {
                    result = true;
                    break;
                }
            } else if size >= rule.weight() + kids.len() {
                let mut comp = vec![];
                if self.search_composition(kids, 0, size - rule.weight(), None, &mut comp) {
                    result = true;
                    break;
                }
            }
        }
        self.inhabited.insert((nt, size), result);
        result
    }

    /// Find the lexicographically smallest way to split `remaining` among
    /// `kids[i..]` such that each part is inhabited, and which is strictly
    /// greater than `after` when given. `after` is only passed down while
    /// the prefix chosen so far equals it.
    fn search_composition(
        &mut self,
        kids: &[usize],
        i: usize,
        remaining: usize,
        after: Option<&[usize]>,
        out: &mut Vec<usize>,
    ) -> bool {
        let rest = kids.len() - i - 1;
        if rest == 0 {
            if after.map_or(false, |a| remaining <= a[i]) || !self.inhabited(kids[i], remaining)
            {
                return false;
            }
            out.push(remaining);
            return true;
        }
        let lo = after.map_or(1, |a| a[i]).max(1);
        for part in lo..=remaining.saturating_sub(rest) {
            if !self.inhabited(kids[i], part) {
                continue;
            }
            let tight = after.filter(|a| a[i] == part);
            out.push(part);
            if self.search_composition(kids, i + 1, remaining - part, tight, out) {
                return true;
            }
            out.pop();
        }
        false
    }

    fn build(&mut self, nt: usize, rule: usize, size: usize, comp: &[usize]) -> Option<Deriv> {
        let g = self.grammar;
        let kids = g.rules(nt)[rule].children();
        let children = kids
            .iter()
            .zip(comp)
            .map(|(&c, &part)| self.first(c, part))
            .collect::<Option<Vec<_>>>()?;
        Some(Deriv {
            nt,
            rule,
            size,
            children,
        })
    }

    fn first_with_rule(&mut self, nt: usize, rule: usize, size: usize) -> Option<Deriv> {
        let g = self.grammar;
        let r = &g.rules(nt)[rule];
        let kids = r.children();
        if kids.is_empty() {
            return (size == r.weight()).then(|| Deriv {
                nt,
                rule,
                size,
                children: vec![],
            });
        }
        if size < r.weight() + kids.len() {
            return None;
        }
        let mut comp = vec![];
        if !self.search_composition(kids, 0, size - r.weight(), None, &mut comp) {
            return None;
        }
        self.build(nt, rule, size, &comp)
    }

    /// The first derivation of `nt` with exactly `size`.
    fn first(&mut self, nt: usize, size: usize) -> Option<Deriv> {
        if !self.inhabited(nt, size) {
            return None;
        }
        let rules = self.grammar.rules(nt).len();
        (0..rules).find_map(|rule| self.first_with_rule(nt, rule, size))
    }

    /// The derivation after `d` with the same nonterminal and size.
    fn successor(&mut self, d: &Deriv) -> Option<Deriv> {
        // advance the children, rightmost fastest
        for i in (0..d.children.len()).rev() {
            if let Some(next) = self.successor(&d.children[i]) {
                let mut children = d.children[..i].to_vec();
                children.push(next);
                for c in &d.children[i + 1..] {
                    children.push(self.first(c.nt, c.size)?);
                }
                return Some(Deriv {
                    nt: d.nt,
                    rule: d.rule,
                    size: d.size,
                    children,
                });
            }
        }
        // then the split of sizes among the children
        let g = self.grammar;
        let r = &g.rules(d.nt)[d.rule];
        if !r.children().is_empty() {
            let current = d.child_sizes();
            let mut comp = vec![];
            let remaining = d.size - r.weight();
            if self.search_composition(r.children(), 0, remaining, Some(&current), &mut comp) {
                return self.build(d.nt, d.rule, d.size, &comp);
            }
        }
        // then the rule
        (d.rule + 1..g.rules(d.nt).len()).find_map(|rule| self.first_with_rule(d.nt, rule, d.size))
    }

    fn term(&self, d: &Deriv) -> Term {
        let rule = &self.grammar.rules(d.nt)[d.rule];
        let children = d.children.iter().map(|c| self.term(c)).collect();
        self.grammar.instantiate(rule, children)
    }

    fn next_size(&mut self) -> Option<Deriv> {
        loop {
            self.size += 1;
            if self.limit.map_or(false, |max| self.size > max) {
                return None;
            }
            if let Some(d) = self.first(self.grammar.start(), self.size) {
                return Some(d);
            }
        }
    }

    /// The size of the last term produced, or 0 before the first one.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the enumeration has signalled exhaustion.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Save the current point of the enumeration.
    pub fn position(&self) -> Position {
        Position {
            size: self.size,
            current: self.current.clone(),
            seen: self.seen.clone(),
        }
    }

    /// Continue from a saved point: the next term produced is the one that
    /// followed the saved point.
    pub fn resume(&mut self, position: Position) {
        self.size = position.size;
        self.current = position.current;
        self.seen = position.seen;
        self.exhausted = false;
    }
}

impl Iterator for Enumerator<'_> {
    type Item = Term;

    /// The next term, or None once the space is exhausted.
    fn next(&mut self) -> Option<Term> {
        while !self.exhausted {
            let next = match self.current.take() {
                Some(d) => self.successor(&d),
                None => None,
            };
            let d = match next {
                Some(d) => d,
                None => match self.next_size() {
                    Some(d) => {
                        self.seen.clear();
                        d
                    }
                    None => {
                        self.exhausted = true;
                        return None;
                    }
                },
            };
            let t = self.term(&d);
            let size = d.size;
            self.current = Some(d);
            let smaller = self
                .grammar
                .min_size(self.grammar.start(), &t)
                .map_or(false, |min| min < size);
            if !smaller && self.seen.insert(t.clone()) {
                return Some(t);
            }
        }
        None
    }
}
