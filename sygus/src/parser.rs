// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Parser for the SyGuS input format, invariant track.
//!
//! Input files are first read as a sequence of s-expressions (keeping the
//! byte range of each top-level command for error reporting), then each
//! s-expression is interpreted as a command.

use smtlib::sexp::{self, Atom, Sexp};
use std::ops::Range;
use thiserror::Error;

use crate::{
    logic::Logic,
    syntax::{Binder, FunDef, NOp, NumOp, NumRel, Sort, Term},
};

/// A value together with the part of the input it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    /// Byte range in the input
    pub span: Range<usize>,
    #[allow(missing_docs)]
    pub node: T,
}

/// One right-hand side of a grammar production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrammarRule {
    /// A term whose identifiers may refer to nonterminals
    Term(Term),
    /// `(Constant S)`: any literal of the sort
    Constant(Sort),
    /// `(Variable S)`: any parameter of the sort
    Variable(Sort),
}

/// A nonterminal with its sort and productions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonterminalDef {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub sort: Sort,
    #[allow(missing_docs)]
    pub rules: Vec<GrammarRule>,
}

/// A grammar as written in the input. The first nonterminal is the start
/// symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarDef {
    #[allow(missing_docs)]
    pub nonterminals: Vec<NonterminalDef>,
}

/// A SyGuS command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `(set-logic L)`
    SetLogic(Logic),
    /// `(set-option :name value)`
    SetOption {
        /// Option name, without the leading colon
        name: String,
        #[allow(missing_docs)]
        value: String,
    },
    /// `(declare-var x S)` or `(declare-primed-var x S)`; carries no
    /// information for invariant problems since the invariant's parameters
    /// name the state.
    DeclareVar(Binder),
    /// `(define-fun f ((x S)..) S body)`
    DefineFun(FunDef),
    /// `(synth-inv f ((x S)..) [grammar])` or `(synth-fun f ((x S)..) S [grammar])`
    SynthFun {
        #[allow(missing_docs)]
        name: String,
        #[allow(missing_docs)]
        params: Vec<Binder>,
        #[allow(missing_docs)]
        ret: Sort,
        #[allow(missing_docs)]
        grammar: Option<GrammarDef>,
    },
    /// `(inv-constraint inv pre trans post)`
    #[allow(missing_docs)]
    InvConstraint {
        inv: String,
        pre: String,
        trans: String,
        post: String,
    },
    /// `(check-synth)`
    CheckSynth,
}

/// An error encountered while parsing an input file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The input is not a sequence of s-expressions.
    #[error("syntax error: expected {expected}")]
    Syntax {
        #[allow(missing_docs)]
        expected: String,
        /// Byte offset of the error
        offset: usize,
    },
    /// An s-expression is not a well-formed command.
    #[error("{msg}")]
    Malformed {
        #[allow(missing_docs)]
        msg: String,
        /// The command the problem is in
        span: Range<usize>,
    },
}

impl ParseError {
    /// The part of the input to blame.
    pub fn span(&self) -> Range<usize> {
        match self {
            ParseError::Syntax { offset, .. } => *offset..*offset,
            ParseError::Malformed { span, .. } => span.clone(),
        }
    }
}

type Result<T> = std::result::Result<T, String>;

fn fail<T, S: Into<String>>(msg: S) -> Result<T> {
    Err(msg.into())
}

/// Parse a sort name.
pub fn sort(s: &Sexp) -> Result<Sort> {
    match s.atom_s() {
        Some("Bool") => Ok(Sort::Bool),
        Some("Int") => Ok(Sort::Int),
        _ => fail(format!("unsupported sort {s}")),
    }
}

/// Parse a list of sorted parameters `((x S) ...)`.
pub fn binders(s: &Sexp) -> Result<Vec<Binder>> {
    let Some(ss) = s.list() else {
        return fail(format!("expected parameter list, found {s}"));
    };
    ss.iter()
        .map(|b| match b.list() {
            Some([name, s]) => match name.atom_s() {
                Some(name) => Ok(Binder::new(name, sort(s)?)),
                None => fail(format!("expected parameter name, found {name}")),
            },
            _ => fail(format!("expected (name sort), found {b}")),
        })
        .collect()
}

fn arity(head: &str, args: &[Sexp], n: usize) -> Result<()> {
    if args.len() != n {
        return fail(format!(
            "{head} expects {n} arguments but was given {}",
            args.len()
        ));
    }
    Ok(())
}

fn fold_num(op: NumOp, args: Vec<Term>) -> Term {
    let mut args = args.into_iter();
    let first = args.next().unwrap_or(Term::int(0));
    args.fold(first, |acc, t| Term::num_op(op, acc, t))
}

/// Parse a term. Identifiers are not resolved, so this also parses grammar
/// rules that mention nonterminals.
pub fn term(s: &Sexp) -> Result<Term> {
    match s {
        Sexp::Atom(Atom::I(i)) => i64::try_from(*i)
            .map(Term::int)
            .map_err(|_| format!("numeral {i} is too large")),
        Sexp::Atom(Atom::S(name)) => match name.as_str() {
            "true" => Ok(Term::true_()),
            "false" => Ok(Term::false_()),
            _ => Ok(Term::id(name)),
        },
        Sexp::Comment(_) => fail("unexpected comment"),
        Sexp::List(_) => {
            let Some((head, args)) = s.app() else {
                return fail(format!("cannot parse {s} as a term"));
            };
            if args.is_empty() {
                return fail(format!("application of {head} to no arguments"));
            }
            if head == "-" && args.len() == 1 {
                // negative literals are written (- n)
                if let Some(i) = s.int() {
                    return Ok(Term::int(i));
                }
            }
            let ts = args.iter().map(term).collect::<Result<Vec<_>>>()?;
            let binary = |f: fn(Term, Term) -> Term| -> Result<Term> {
                arity(head, args, 2)?;
                Ok(f(ts[0].clone(), ts[1].clone()))
            };
            let rel = |r: NumRel| -> Result<Term> {
                arity(head, args, 2)?;
                Ok(Term::num_rel(r, &ts[0], &ts[1]))
            };
            match head {
                "not" => {
                    arity(head, args, 1)?;
                    Ok(Term::not(&ts[0]))
                }
                "-" if ts.len() == 1 => Ok(Term::neg(&ts[0])),
                "-" => Ok(fold_num(NumOp::Sub, ts)),
                "+" => Ok(fold_num(NumOp::Add, ts)),
                "*" => Ok(fold_num(NumOp::Mul, ts)),
                "=" => binary(Term::equals),
                "distinct" => binary(|a, b| Term::not(Term::equals(a, b))),
                "=>" => {
                    // right associative
                    let mut ts = ts;
                    let Some(last) = ts.pop() else {
                        return fail("=> needs arguments");
                    };
                    Ok(ts.into_iter().rev().fold(last, |acc, t| Term::implies(t, acc)))
                }
                "and" => Ok(Term::NAryOp(NOp::And, ts)),
                "or" => Ok(Term::NAryOp(NOp::Or, ts)),
                "<" => rel(NumRel::Lt),
                "<=" => rel(NumRel::Leq),
                ">=" => rel(NumRel::Geq),
                ">" => rel(NumRel::Gt),
                "ite" => {
                    arity(head, args, 3)?;
                    Ok(Term::ite(&ts[0], &ts[1], &ts[2]))
                }
                "let" | "forall" | "exists" => fail(format!("{head} is not supported")),
                _ => Ok(Term::app(head, ts)),
            }
        }
    }
}

fn grammar_rule(s: &Sexp) -> Result<GrammarRule> {
    match s.app() {
        Some(("Constant", [srt])) => Ok(GrammarRule::Constant(sort(srt)?)),
        Some(("Variable", [srt])) => Ok(GrammarRule::Variable(sort(srt)?)),
        _ => term(s).map(GrammarRule::Term),
    }
}

fn nonterminal_def(s: &Sexp) -> Result<NonterminalDef> {
    match s.list() {
        Some([name, srt, rules]) => {
            let Some(name) = name.atom_s() else {
                return fail(format!("expected nonterminal name, found {name}"));
            };
            let Some(rules) = rules.list() else {
                return fail(format!("expected list of rules for {name}"));
            };
            Ok(NonterminalDef {
                name: name.to_string(),
                sort: sort(srt)?,
                rules: rules.iter().map(grammar_rule).collect::<Result<_>>()?,
            })
        }
        _ => fail(format!("expected (name sort (rules..)), found {s}")),
    }
}

/// Parse a grammar, given either in SyGuS v2 form (a list of declared
/// nonterminals followed by their rules) or in v1 form (only the rules).
pub fn grammar(args: &[Sexp]) -> Result<GrammarDef> {
    let defs = match args {
        [decls, defs] => {
            let decls = decls
                .list()
                .ok_or_else(|| format!("expected nonterminal declarations, found {decls}"))?;
            let defs = defs
                .list()
                .ok_or_else(|| format!("expected grammar rules, found {defs}"))?;
            let defs = defs.iter().map(nonterminal_def).collect::<Result<Vec<_>>>()?;
            let declared = decls
                .iter()
                .map(|d| binders(&Sexp::List(vec![d.clone()])).map(|mut b| b.remove(0)))
                .collect::<Result<Vec<_>>>()?;
            if declared.len() != defs.len()
                || declared
                    .iter()
                    .zip(&defs)
                    .any(|(b, d)| b.name != d.name || b.sort != d.sort)
            {
                return fail("grammar rules do not match the declared nonterminals");
            }
            defs
        }
        [defs] => {
            let defs = defs
                .list()
                .ok_or_else(|| format!("expected grammar rules, found {defs}"))?;
            defs.iter().map(nonterminal_def).collect::<Result<Vec<_>>>()?
        }
        _ => return fail("malformed grammar"),
    };
    Ok(GrammarDef { nonterminals: defs })
}

fn symbol(s: &Sexp) -> Result<String> {
    s.atom_s()
        .map(|s| s.to_string())
        .ok_or_else(|| format!("expected a symbol, found {s}"))
}

/// Interpret one s-expression as a command.
pub fn command(s: &Sexp) -> Result<Command> {
    let Some((head, args)) = s.app() else {
        return fail(format!("expected a command, found {s}"));
    };
    match head {
        "set-logic" => {
            arity(head, args, 1)?;
            symbol(&args[0])?.parse().map(Command::SetLogic)
        }
        "set-option" => {
            arity(head, args, 2)?;
            let name = symbol(&args[0])?;
            let Some(name) = name.strip_prefix(':') else {
                return fail(format!("option name {name} should start with :"));
            };
            Ok(Command::SetOption {
                name: name.to_string(),
                value: args[1].to_string(),
            })
        }
        "declare-var" | "declare-primed-var" => {
            arity(head, args, 2)?;
            Ok(Command::DeclareVar(Binder::new(
                &symbol(&args[0])?,
                sort(&args[1])?,
            )))
        }
        "define-fun" => {
            arity(head, args, 4)?;
            Ok(Command::DefineFun(FunDef {
                name: symbol(&args[0])?,
                params: binders(&args[1])?,
                ret: sort(&args[2])?,
                body: term(&args[3])?,
            }))
        }
        "synth-inv" => {
            if args.len() < 2 {
                return fail("synth-inv expects a name and parameters");
            }
            Ok(Command::SynthFun {
                name: symbol(&args[0])?,
                params: binders(&args[1])?,
                ret: Sort::Bool,
                grammar: if args.len() > 2 {
                    Some(grammar(&args[2..])?)
                } else {
                    None
                },
            })
        }
        "synth-fun" => {
            if args.len() < 3 {
                return fail("synth-fun expects a name, parameters and a sort");
            }
            Ok(Command::SynthFun {
                name: symbol(&args[0])?,
                params: binders(&args[1])?,
                ret: sort(&args[2])?,
                grammar: if args.len() > 3 {
                    Some(grammar(&args[3..])?)
                } else {
                    None
                },
            })
        }
        "inv-constraint" => {
            arity(head, args, 4)?;
            Ok(Command::InvConstraint {
                inv: symbol(&args[0])?,
                pre: symbol(&args[1])?,
                trans: symbol(&args[2])?,
                post: symbol(&args[3])?,
            })
        }
        "check-synth" => {
            arity(head, args, 0)?;
            Ok(Command::CheckSynth)
        }
        _ => fail(format!("unsupported command {head}")),
    }
}

/// Parse a SyGuS input file into a sequence of commands.
pub fn parse_problem(src: &str) -> std::result::Result<Vec<Spanned<Command>>, ParseError> {
    let sexps = sexp::parse_many_spanned(src).map_err(|e| ParseError::Syntax {
        expected: e.expected.to_string(),
        offset: e.location.offset,
    })?;
    sexps
        .into_iter()
        .filter_map(|(span, s)| s.without_comments().map(|s| (span, s)))
        .map(|(span, s)| match command(&s) {
            Ok(node) => Ok(Spanned { span, node }),
            Err(msg) => Err(ParseError::Malformed { msg, span }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{command, parse_problem, term, Command, GrammarRule, ParseError};
    use crate::{
        logic::Logic,
        syntax::{NumOp, Sort, Term},
    };
    use smtlib::sexp::parse;

    const COUNTER: &str = r#"
(set-logic LIA)
(synth-inv inv-f ((x Int)))
(define-fun pre-f ((x Int)) Bool (= x 0))
(define-fun trans-f ((x Int) (x! Int)) Bool
  (ite (< x 10) (= x! (+ x 1)) (= x! x)))
(define-fun post-f ((x Int)) Bool (<= x 10))
(inv-constraint inv-f pre-f trans-f post-f)
; solve it
(check-synth)
"#;

    #[test]
    fn test_parse_counter() {
        let cmds = parse_problem(COUNTER).unwrap();
        assert_eq!(cmds.len(), 7);
        assert_eq!(cmds[0].node, Command::SetLogic(Logic::Lia));
        assert_eq!(&COUNTER[cmds[0].span.clone()], "(set-logic LIA)");
        let Command::DefineFun(trans) = &cmds[3].node else {
            panic!("expected a definition, got {:?}", cmds[3].node)
        };
        assert_eq!(trans.params.len(), 2);
        insta::assert_snapshot!(trans, @"(define-fun trans-f ((x Int) (x! Int)) Bool (ite (< x 10) (= x! (+ x 1)) (= x! x)))");
        assert_eq!(cmds[6].node, Command::CheckSynth);
    }

    #[test]
    fn test_negative_literals_and_folding() {
        assert_eq!(term(&parse("(- 5)").unwrap()), Ok(Term::int(-5)));
        assert_eq!(
            term(&parse("(- x)").unwrap()),
            Ok(Term::neg(Term::id("x")))
        );
        let x = Term::id("x");
        assert_eq!(
            term(&parse("(+ x 1 2)").unwrap()),
            Ok(Term::num_op(
                NumOp::Add,
                Term::num_op(NumOp::Add, &x, Term::int(1)),
                Term::int(2)
            ))
        );
        assert!(term(&parse("(ite x 1)").unwrap()).is_err());
    }

    #[test]
    fn test_parse_grammar_v2() {
        let cmd = command(
            &parse(
                "(synth-fun inv ((x Int)) Bool ((B Bool) (I Int))
                   ((B Bool ((<= I I) (and B B)))
                    (I Int (x (Constant Int) (Variable Int)))))",
            )
            .unwrap(),
        )
        .unwrap();
        let Command::SynthFun { grammar: Some(g), ret, .. } = cmd else {
            panic!("expected a grammar");
        };
        assert_eq!(ret, Sort::Bool);
        assert_eq!(g.nonterminals.len(), 2);
        assert_eq!(g.nonterminals[1].rules[1], GrammarRule::Constant(Sort::Int));
        assert_eq!(g.nonterminals[1].rules[2], GrammarRule::Variable(Sort::Int));
    }

    #[test]
    fn test_errors_have_spans() {
        let src = "(set-logic LIA)\n(frobnicate 1)";
        let err = parse_problem(src).unwrap_err();
        assert_eq!(err.to_string(), "unsupported command frobnicate");
        assert_eq!(&src[err.span()], "(frobnicate 1)");

        let err = parse_problem("(set-logic LIA").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }), "{err:?}");
    }
}
