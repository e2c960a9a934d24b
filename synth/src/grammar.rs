// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Grammars describing the space of candidate invariants.
//!
//! A grammar is a list of sorted nonterminals, the first of which is the
//! boolean start symbol, each with an ordered list of rules. A rule is a term
//! template in which every occurrence of a nonterminal's name is a hole to be
//! filled with a term derived from that nonterminal.

use itertools::Itertools;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

use sygus::{
    logic::{Logic, LogicError},
    parser::{GrammarDef, GrammarRule},
    sorts::{self, SortError},
    subst::map_children,
    syntax::{Binder, NOp, NumOp, NumRel, Signature, Sort, Term},
};

/// An error in a user-supplied grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// A grammar needs at least the start symbol.
    #[error("grammar has no nonterminals")]
    NoNonterminals,
    /// The start symbol must produce formulas.
    #[error("start symbol {name} has sort {sort}, but it must be Bool")]
    StartNotBool {
        #[allow(missing_docs)]
        name: String,
        #[allow(missing_docs)]
        sort: Sort,
    },
    /// A rule was added to a nonterminal that was never declared.
    #[error("unknown nonterminal {0}")]
    UnknownNonterminal(String),
    /// A nonterminal was declared twice, or shares a name with a parameter.
    #[error("{0} was declared multiple times")]
    RedeclaredName(String),
    /// The same right-hand side was given twice for a nonterminal.
    #[error("duplicate rule {rule} for {nonterminal}")]
    DuplicateRule {
        #[allow(missing_docs)]
        nonterminal: String,
        #[allow(missing_docs)]
        rule: String,
    },
    /// A rule is not well sorted, or has a different sort than its nonterminal.
    #[error("rule {rule} for {nonterminal}: {err}")]
    IllSorted {
        #[allow(missing_docs)]
        nonterminal: String,
        #[allow(missing_docs)]
        rule: String,
        #[allow(missing_docs)]
        err: SortError,
    },
    /// A rule uses an operator outside the logic.
    #[error("rule {rule} for {nonterminal}: {err}")]
    OutsideLogic {
        #[allow(missing_docs)]
        nonterminal: String,
        #[allow(missing_docs)]
        rule: String,
        #[allow(missing_docs)]
        err: LogicError,
    },
}

/// A sorted nonterminal.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonterminal {
    pub name: String,
    pub sort: Sort,
}

/// One production: a template and the nonterminals of its holes, in the
/// left-to-right order the holes occur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    template: Term,
    children: Vec<usize>,
    weight: usize,
}

impl Rule {
    /// The right-hand side, with nonterminal names as holes.
    pub fn template(&self) -> &Term {
        &self.template
    }

    /// The nonterminal of each hole.
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// The number of nodes this rule contributes to a term, not counting
    /// its holes. A rule that is a bare nonterminal still counts as one, so
    /// every derivation step makes the derivation larger.
    pub fn weight(&self) -> usize {
        self.weight
    }
}

/// An immutable grammar. Nonterminal 0 is the start symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    nonterminals: Vec<Nonterminal>,
    rules: Vec<Vec<Rule>>,
}

fn holes(t: &Term, index: &HashMap<&str, usize>, out: &mut Vec<usize>) {
    match t {
        Term::Id(name) => {
            if let Some(&i) = index.get(name.as_str()) {
                out.push(i);
            }
        }
        _ => {
            for child in t.children() {
                holes(child, index, out);
            }
        }
    }
}

fn fill(t: &Term, index: &HashMap<&str, usize>, args: &mut std::vec::IntoIter<Term>) -> Term {
    match t {
        Term::Id(name) if index.contains_key(name.as_str()) => {
            args.next().unwrap_or_else(|| t.clone())
        }
        _ => map_children(t, |child| fill(child, index, args)),
    }
}

/// Match `t` against a rule template, collecting the subterm bound to each
/// hole in hole order.
fn matches_template<'t>(
    template: &Term,
    t: &'t Term,
    index: &HashMap<&str, usize>,
    out: &mut Vec<(usize, &'t Term)>,
) -> bool {
    if let Term::Id(name) = template {
        if let Some(&nt) = index.get(name.as_str()) {
            out.push((nt, t));
            return true;
        }
    }
    let (tc, cc) = (template.children(), t.children());
    let blank = |_: &Term| Term::true_();
    tc.len() == cc.len()
        && map_children(template, blank) == map_children(t, blank)
        && tc
            .into_iter()
            .zip(cc)
            .all(|(a, b)| matches_template(a, b, index, out))
}

fn fresh_name(base: &str, params: &[Binder]) -> String {
    let mut name = base.to_string();
    while params.iter().any(|b| b.name == name) {
        name.push('!');
    }
    name
}

impl Grammar {
    fn from_rules(nonterminals: Vec<Nonterminal>, templates: Vec<Vec<Term>>) -> Self {
        let index: HashMap<&str, usize> = nonterminals
            .iter()
            .enumerate()
            .map(|(i, nt)| (nt.name.as_str(), i))
            .collect();
        let rules = templates
            .into_iter()
            .map(|ts| {
                ts.into_iter()
                    .map(|template| {
                        let mut children = vec![];
                        holes(&template, &index, &mut children);
                        let weight = (template.size() - children.len()).max(1);
                        Rule {
                            template,
                            children,
                            weight,
                        }
                    })
                    .collect()
            })
            .collect();
        Self {
            nonterminals,
            rules,
        }
    }

    /// The default grammar for an invariant over `params`.
    ///
    /// The start symbol produces `true`, `false`, the boolean parameters,
    /// `not`, `and`, `or` and, when the logic has integers, the comparisons
    /// `=`, `<=`, `<`, `>=` of integer terms. Integer terms are the integer
    /// parameters, `0`, `1`, the given constants, `+`, `-`, and `*` only in
    /// non-linear logics.
    pub fn default_for(params: &[Binder], logic: Logic, constants: &BTreeSet<i64>) -> Self {
        let start = fresh_name("Start", params);
        let int = fresh_name("StartInt", params);
        let (b, i) = (Term::id(&start), Term::id(&int));

        let mut bool_rules = vec![Term::true_(), Term::false_()];
        bool_rules.extend(
            params
                .iter()
                .filter(|p| p.sort == Sort::Bool)
                .map(|p| Term::id(&p.name)),
        );
        bool_rules.push(Term::not(&b));
        bool_rules.push(Term::NAryOp(NOp::And, vec![b.clone(), b.clone()]));
        bool_rules.push(Term::NAryOp(NOp::Or, vec![b.clone(), b]));

        let mut nonterminals = vec![Nonterminal {
            name: start,
            sort: Sort::Bool,
        }];
        if !logic.has_ints() {
            return Self::from_rules(nonterminals, vec![bool_rules]);
        }

        bool_rules.push(Term::equals(&i, &i));
        for rel in [NumRel::Leq, NumRel::Lt, NumRel::Geq] {
            bool_rules.push(Term::num_rel(rel, &i, &i));
        }

        let mut int_rules = params
            .iter()
            .filter(|p| p.sort == Sort::Int)
            .map(|p| Term::id(&p.name))
            .collect_vec();
        int_rules.extend(
            [0, 1]
                .into_iter()
                .chain(constants.iter().copied().filter(|c| *c != 0 && *c != 1))
                .map(Term::int),
        );
        int_rules.push(Term::num_op(NumOp::Add, &i, &i));
        int_rules.push(Term::num_op(NumOp::Sub, &i, &i));
        if logic.is_nonlinear() {
            int_rules.push(Term::num_op(NumOp::Mul, &i, &i));
        }
        nonterminals.push(Nonterminal {
            name: int,
            sort: Sort::Int,
        });
        Self::from_rules(nonterminals, vec![bool_rules, int_rules])
    }

    /// The index of the start symbol.
    pub fn start(&self) -> usize {
        0
    }

    #[allow(missing_docs)]
    pub fn nonterminals(&self) -> &[Nonterminal] {
        &self.nonterminals
    }

    /// The rules of a nonterminal, in enumeration order.
    pub fn rules(&self, nt: usize) -> &[Rule] {
        &self.rules[nt]
    }

    /// Fill the holes of a rule with the given terms.
    pub fn instantiate(&self, rule: &Rule, children: Vec<Term>) -> Term {
        if children.is_empty() {
            return rule.template.clone();
        }
        fill(&rule.template, &self.index(), &mut children.into_iter())
    }

    fn index(&self) -> HashMap<&str, usize> {
        self.nonterminals
            .iter()
            .enumerate()
            .map(|(i, nt)| (nt.name.as_str(), i))
            .collect()
    }

    /// The size of the smallest derivation of `t` from `nt`, or None if `nt`
    /// does not derive `t`.
    pub fn min_size(&self, nt: usize, t: &Term) -> Option<usize> {
        let index = self.index();
        let mut memo = HashMap::new();
        self.min_sizes(&index, t, &mut memo)[nt]
    }

    /// The smallest derivation size of `t` from every nonterminal.
    fn min_sizes<'t>(
        &self,
        index: &HashMap<&str, usize>,
        t: &'t Term,
        memo: &mut HashMap<&'t Term, Vec<Option<usize>>>,
    ) -> Vec<Option<usize>> {
        if let Some(sizes) = memo.get(t) {
            return sizes.clone();
        }
        let n = self.nonterminals.len();
        let mut best: Vec<Option<usize>> = vec![None; n];
        let mut chains = vec![];
        for (nt, rules) in self.rules.iter().enumerate() {
            for r in rules {
                if let (Term::Id(_), [c]) = (&r.template, r.children.as_slice()) {
                    chains.push((nt, *c, r.weight));
                    continue;
                }
                let mut bindings = vec![];
                if !matches_template(&r.template, t, index, &mut bindings) {
                    continue;
                }
                let size = bindings.into_iter().try_fold(r.weight, |acc, (c, sub)| {
                    Some(acc + self.min_sizes(index, sub, memo)[c]?)
                });
                if let Some(s) = size {
                    best[nt] = Some(best[nt].map_or(s, |b| b.min(s)));
                }
            }
        }
        // bare nonterminal rules derive the same term, so relax them to a
        // fixed point
        let mut changed = true;
        while changed {
            changed = false;
            for &(nt, c, weight) in &chains {
                if let Some(s) = best[c].map(|s| s + weight) {
                    if best[nt].map_or(true, |b| s < b) {
                        best[nt] = Some(s);
                        changed = true;
                    }
                }
            }
        }
        memo.insert(t, best.clone());
        best
    }

    /// Nonterminals that derive at least one finite term.
    fn productive(&self) -> Vec<bool> {
        let mut productive = vec![false; self.nonterminals.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for (nt, rules) in self.rules.iter().enumerate() {
                if !productive[nt]
                    && rules
                        .iter()
                        .any(|r| r.children.iter().all(|&c| productive[c]))
                {
                    productive[nt] = true;
                    changed = true;
                }
            }
        }
        productive
    }

    /// The size of the largest derivation in the language, if the language
    /// is finite. An empty language has maximum size 0.
    ///
    /// The size of a derivation is the sum of the weights of its rules, which
    /// is the size of the derived term unless the grammar has rules that are
    /// a bare nonterminal.
    ///
    /// The language is infinite exactly when a cycle of productive rules is
    /// reachable from the start symbol.
    pub fn max_size(&self) -> Option<usize> {
        let productive = self.productive();
        if !productive[self.start()] {
            return Some(0);
        }
        let useful = |r: &Rule| r.children.iter().all(|&c| productive[c]);

        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done(usize),
        }
        fn visit(
            g: &Grammar,
            nt: usize,
            useful: &dyn Fn(&Rule) -> bool,
            marks: &mut Vec<Mark>,
        ) -> Option<usize> {
            match marks[nt] {
                Mark::Done(n) => return Some(n),
                Mark::InProgress => return None,
                Mark::Unvisited => {}
            }
            marks[nt] = Mark::InProgress;
            let mut max = 0;
            for r in g.rules[nt].iter().filter(|r| useful(r)) {
                let mut size = r.weight;
                for &c in &r.children {
                    size += visit(g, c, useful, marks)?;
                }
                max = max.max(size);
            }
            marks[nt] = Mark::Done(max);
            Some(max)
        }
        let mut marks = vec![Mark::Unvisited; self.nonterminals.len()];
        visit(self, self.start(), &useful, &mut marks)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RuleSpec {
    Term(Term),
    AnyConstant,
    AnyVariable,
}

/// Incrementally build and validate a user-supplied [`Grammar`].
///
/// The first declared nonterminal is the start symbol and must be boolean.
/// Rules may refer to the parameters of the function being synthesized and
/// to declared nonterminals.
#[derive(Debug, Clone)]
pub struct GrammarBuilder {
    params: Vec<Binder>,
    logic: Logic,
    nonterminals: Vec<Nonterminal>,
    rules: Vec<Vec<RuleSpec>>,
}

impl GrammarBuilder {
    /// Start a grammar for a function with the given parameters.
    pub fn new(params: &[Binder], logic: Logic) -> Self {
        Self {
            params: params.to_vec(),
            logic,
            nonterminals: vec![],
            rules: vec![],
        }
    }

    /// Build a grammar from its parsed form.
    pub fn from_def(params: &[Binder], logic: Logic, def: &GrammarDef) -> Result<Self, GrammarError> {
        let mut builder = Self::new(params, logic);
        for nt in &def.nonterminals {
            builder.declare(&nt.name, nt.sort)?;
        }
        for nt in &def.nonterminals {
            for rule in &nt.rules {
                match rule {
                    GrammarRule::Term(t) => builder.add_rule(&nt.name, t.clone())?,
                    GrammarRule::Constant(sort) => {
                        builder.check_sort(&nt.name, *sort)?;
                        builder.add_any_constant(&nt.name)?
                    }
                    GrammarRule::Variable(sort) => {
                        builder.check_sort(&nt.name, *sort)?;
                        builder.add_any_variable(&nt.name)?
                    }
                }
            }
        }
        Ok(builder)
    }

    fn index(&self, nt: &str) -> Result<usize, GrammarError> {
        self.nonterminals
            .iter()
            .position(|n| n.name == nt)
            .ok_or_else(|| GrammarError::UnknownNonterminal(nt.to_string()))
    }

    fn check_sort(&self, nt: &str, sort: Sort) -> Result<(), GrammarError> {
        let i = self.index(nt)?;
        let expected = self.nonterminals[i].sort;
        if expected != sort {
            return Err(GrammarError::IllSorted {
                nonterminal: nt.to_string(),
                rule: format!("({sort})"),
                err: SortError::ExpectedButFoundSorts {
                    expected,
                    found: sort,
                },
            });
        }
        Ok(())
    }

    /// Declare a nonterminal. The first one declared is the start symbol.
    pub fn declare(&mut self, name: &str, sort: Sort) -> Result<(), GrammarError> {
        if self.nonterminals.is_empty() && sort != Sort::Bool {
            return Err(GrammarError::StartNotBool {
                name: name.to_string(),
                sort,
            });
        }
        if self.nonterminals.iter().any(|n| n.name == name)
            || self.params.iter().any(|p| p.name == name)
        {
            return Err(GrammarError::RedeclaredName(name.to_string()));
        }
        self.nonterminals.push(Nonterminal {
            name: name.to_string(),
            sort,
        });
        self.rules.push(vec![]);
        Ok(())
    }

    /// Add a rule to a nonterminal.
    pub fn add_rule(&mut self, nt: &str, rule: Term) -> Result<(), GrammarError> {
        let i = self.index(nt)?;
        let ctx: sorts::Context = self
            .params
            .iter()
            .map(|b| (b.name.clone(), b.sort))
            .chain(self.nonterminals.iter().map(|n| (n.name.clone(), n.sort)))
            .collect();
        sorts::check_sort(&Signature::default(), &ctx, &rule, self.nonterminals[i].sort).map_err(
            |err| GrammarError::IllSorted {
                nonterminal: nt.to_string(),
                rule: rule.to_string(),
                err,
            },
        )?;
        self.logic
            .admits(&rule)
            .map_err(|err| GrammarError::OutsideLogic {
                nonterminal: nt.to_string(),
                rule: rule.to_string(),
                err,
            })?;
        if self.rules[i]
            .iter()
            .any(|spec| matches!(spec, RuleSpec::Term(t) if *t == rule))
        {
            return Err(GrammarError::DuplicateRule {
                nonterminal: nt.to_string(),
                rule: rule.to_string(),
            });
        }
        self.rules[i].push(RuleSpec::Term(rule));
        Ok(())
    }

    /// Add several rules to a nonterminal.
    pub fn add_rules<I>(&mut self, nt: &str, rules: I) -> Result<(), GrammarError>
    where
        I: IntoIterator<Item = Term>,
    {
        for rule in rules {
            self.add_rule(nt, rule)?;
        }
        Ok(())
    }

    /// Allow the nonterminal to produce constants of its sort: both literals
    /// for booleans, and for integers `0`, `1` and the constants passed to
    /// [`Self::build`].
    pub fn add_any_constant(&mut self, nt: &str) -> Result<(), GrammarError> {
        let i = self.index(nt)?;
        if self.nonterminals[i].sort == Sort::Int && !self.logic.has_ints() {
            return Err(GrammarError::OutsideLogic {
                nonterminal: nt.to_string(),
                rule: "(Constant Int)".to_string(),
                err: LogicError {
                    logic: self.logic,
                    op: "integer arithmetic".to_string(),
                },
            });
        }
        if !self.rules[i].contains(&RuleSpec::AnyConstant) {
            self.rules[i].push(RuleSpec::AnyConstant);
        }
        Ok(())
    }

    /// Allow the nonterminal to produce any parameter of its sort.
    pub fn add_any_variable(&mut self, nt: &str) -> Result<(), GrammarError> {
        let i = self.index(nt)?;
        if !self.rules[i].contains(&RuleSpec::AnyVariable) {
            self.rules[i].push(RuleSpec::AnyVariable);
        }
        Ok(())
    }

    /// Finish the grammar. `constants` are the integer literals produced by
    /// "any constant" rules besides `0` and `1`. Expansions of "any" rules
    /// that repeat an existing rule are skipped.
    pub fn build(&self, constants: &BTreeSet<i64>) -> Result<Grammar, GrammarError> {
        if self.nonterminals.is_empty() {
            return Err(GrammarError::NoNonterminals);
        }
        let templates = self
            .nonterminals
            .iter()
            .zip(&self.rules)
            .map(|(nt, specs)| {
                let mut seen = HashSet::new();
                let mut ts = vec![];
                for spec in specs {
                    let expansion = match spec {
                        RuleSpec::Term(t) => vec![t.clone()],
                        RuleSpec::AnyConstant => match nt.sort {
                            Sort::Bool => vec![Term::true_(), Term::false_()],
                            Sort::Int => [0, 1]
                                .into_iter()
                                .chain(constants.iter().copied())
                                .unique()
                                .map(Term::int)
                                .collect(),
                        },
                        RuleSpec::AnyVariable => self
                            .params
                            .iter()
                            .filter(|p| p.sort == nt.sort)
                            .map(|p| Term::id(&p.name))
                            .collect(),
                    };
                    for t in expansion {
                        if seen.insert(t.clone()) {
                            ts.push(t);
                        }
                    }
                }
                ts
            })
            .collect();
        Ok(Grammar::from_rules(self.nonterminals.clone(), templates))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{Grammar, GrammarBuilder, GrammarError};
    use sygus::{
        logic::Logic,
        syntax::{Binder, NOp, NumOp, NumRel, Sort, Term},
    };

    fn x() -> Vec<Binder> {
        vec![Binder::new("x", Sort::Int)]
    }

    #[test]
    fn test_default_grammar_rules() {
        let constants = BTreeSet::from([0, 10]);
        let g = Grammar::default_for(&x(), Logic::Lia, &constants);
        assert_eq!(g.nonterminals().len(), 2);
        let rendered = g
            .rules(1)
            .iter()
            .map(|r| r.template().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec!["x", "0", "1", "10", "(+ StartInt StartInt)", "(- StartInt StartInt)"]
        );
        assert_eq!(g.rules(0).len(), 9);
        assert_eq!(g.rules(0)[6].children(), &[1, 1]);
        assert_eq!(g.max_size(), None);
    }

    #[test]
    fn test_default_grammar_nonlinear_and_core() {
        let g = Grammar::default_for(&x(), Logic::Nia, &BTreeSet::new());
        assert!(g
            .rules(1)
            .iter()
            .any(|r| matches!(r.template(), Term::NumOp(NumOp::Mul, _, _))));
        let g = Grammar::default_for(&[Binder::new("b", Sort::Bool)], Logic::Core, &BTreeSet::new());
        assert_eq!(g.nonterminals().len(), 1);
        assert_eq!(g.rules(0)[2].template(), &Term::id("b"));
    }

    #[test]
    fn test_nonterminal_names_avoid_params() {
        let g = Grammar::default_for(&[Binder::new("Start", Sort::Bool)], Logic::Core, &BTreeSet::new());
        assert_eq!(g.nonterminals()[0].name, "Start!");
        // the parameter is a leaf, not a hole
        assert!(g.rules(0)[2].children().is_empty());
    }

    #[test]
    fn test_instantiate_fills_holes_in_order() {
        let g = Grammar::default_for(&x(), Logic::Lia, &BTreeSet::new());
        let le = &g.rules(0)[6];
        let t = g.instantiate(le, vec![Term::id("x"), Term::int(1)]);
        assert_eq!(t, Term::num_rel(NumRel::Leq, Term::id("x"), Term::int(1)));
    }

    #[test]
    fn test_builder_finite_grammar() {
        let mut b = GrammarBuilder::new(&x(), Logic::Lia);
        b.declare("B", Sort::Bool).unwrap();
        b.declare("I", Sort::Int).unwrap();
        b.add_rule("B", Term::num_rel(NumRel::Leq, Term::id("x"), Term::id("I")))
            .unwrap();
        b.add_any_constant("I").unwrap();
        let g = b.build(&BTreeSet::from([1, 7])).unwrap();
        assert_eq!(g.rules(1).len(), 3);
        assert_eq!(g.max_size(), Some(3));
    }

    #[test]
    fn test_builder_errors() {
        let mut b = GrammarBuilder::new(&x(), Logic::Lia);
        assert_eq!(
            b.declare("I", Sort::Int),
            Err(GrammarError::StartNotBool {
                name: "I".to_string(),
                sort: Sort::Int
            })
        );
        b.declare("B", Sort::Bool).unwrap();
        assert_eq!(
            b.declare("x", Sort::Int),
            Err(GrammarError::RedeclaredName("x".to_string()))
        );
        assert_eq!(
            b.add_rule("C", Term::true_()),
            Err(GrammarError::UnknownNonterminal("C".to_string()))
        );
        assert!(matches!(
            b.add_rule("B", Term::id("x")),
            Err(GrammarError::IllSorted { .. })
        ));
        let nonlinear = Term::num_rel(
            NumRel::Lt,
            Term::num_op(NumOp::Mul, Term::id("x"), Term::id("x")),
            Term::int(4),
        );
        assert!(matches!(
            b.add_rule("B", nonlinear),
            Err(GrammarError::OutsideLogic { .. })
        ));
        let and = Term::NAryOp(NOp::And, vec![Term::id("B"), Term::id("B")]);
        b.add_rule("B", and.clone()).unwrap();
        assert!(matches!(
            b.add_rule("B", and),
            Err(GrammarError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn test_unproductive_start_is_empty() {
        let mut b = GrammarBuilder::new(&x(), Logic::Lia);
        b.declare("B", Sort::Bool).unwrap();
        b.add_rule("B", Term::not(Term::id("B"))).unwrap();
        let g = b.build(&BTreeSet::new()).unwrap();
        assert_eq!(g.max_size(), Some(0));
    }
}
