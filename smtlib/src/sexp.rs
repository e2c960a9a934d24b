// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A custom s-expression data type and parsing.
//!
//! The same representation is used for the commands we send to solvers, for
//! their responses, and for SyGuS input files. Comments are part of the
//! grammar since they appear both in solver output and in input files.

use peg::str::LineCol;
use serde::Serialize;
use std::{fmt, ops::Range};

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
pub enum Atom {
    /// A numeral. SMT-LIB numerals are non-negative; negative values are
    /// written as `(- n)`.
    I(u64),
    S(String),
}

impl Atom {
    /// Return the string value of self, if it is a string.
    pub fn s(&self) -> Option<&str> {
        if let Self::S(s) = self {
            Some(s)
        } else {
            None
        }
    }
}

/// An s-expression which also tracks comments.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
pub enum Sexp {
    Atom(Atom),
    Comment(String),
    List(Vec<Sexp>),
}

/// Construct an sexp atom from a string.
pub fn atom_s<S: AsRef<str>>(s: S) -> Sexp {
    Sexp::Atom(Atom::S(s.as_ref().to_string()))
}

/// Construct an sexp atom from a numeral.
pub fn atom_i(i: u64) -> Sexp {
    Sexp::Atom(Atom::I(i))
}

/// Construct an sexp for a signed integer, using `(- n)` for negative values.
pub fn int(i: i64) -> Sexp {
    if i < 0 {
        app("-", [atom_i(i.unsigned_abs())])
    } else {
        atom_i(i.unsigned_abs())
    }
}

/// Construct an sexp list from an iteratable.
pub fn sexp_l<I>(i: I) -> Sexp
where
    I: IntoIterator,
    I::IntoIter: Iterator<Item = Sexp>,
{
    Sexp::List(i.into_iter().collect())
}

/// Construct an sexp list with a string atom as its "head" element, followed by
/// an iterable of remaining arguments.
pub fn app<I>(head: &str, args: I) -> Sexp
where
    I: IntoIterator,
    I::IntoIter: Iterator<Item = Sexp>,
{
    let mut ss = vec![atom_s(head)];
    #[allow(clippy::useless_conversion)]
    ss.extend(args.into_iter());
    Sexp::List(ss)
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::I(i) => write!(f, "{i}"),
            Atom::S(s) => {
                if s.contains([' ', '\"', '\'']) {
                    write!(f, "|{s}|")
                } else if s.contains('|') {
                    write!(f, "\"{s}\"")
                } else {
                    write!(f, "{s}")
                }
            }
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(s) => write!(f, "{s}"),
            Sexp::Comment(s) => write!(f, ";{s}"),
            Sexp::List(ss) => {
                write!(f, "(")?;
                for (i, s) in ss.iter().enumerate() {
                    let last = i == ss.len() - 1;
                    let this_comment = matches!(s, Sexp::Comment(_));
                    let next_comment = !last && matches!(ss[i + 1], Sexp::Comment(_));
                    let space = if last || this_comment || next_comment {
                        ""
                    } else {
                        " "
                    };
                    if this_comment {
                        write!(f, "\n{s}\n{space}")?;
                    } else {
                        write!(f, "{s}{space}")?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl Sexp {
    /// Return the inner elements if self is a Sexp::List
    pub fn list(&self) -> Option<&[Sexp]> {
        if let Sexp::List(ss) = self {
            Some(ss)
        } else {
            None
        }
    }

    /// Return the inner string if self is a string atom.
    pub fn atom_s(&self) -> Option<&str> {
        if let Sexp::Atom(Atom::S(s)) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Return the inner numeral if self is a numeral atom.
    pub fn atom_i(&self) -> Option<u64> {
        if let Sexp::Atom(Atom::I(i)) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Interpret the s-expression as a signed integer value, accepting both
    /// numerals and `(- n)`.
    pub fn int(&self) -> Option<i64> {
        match self {
            Sexp::Atom(Atom::I(i)) => i64::try_from(*i).ok(),
            Sexp::List(v) if v.len() == 2 && v[0].atom_s() == Some("-") => {
                v[1].int().and_then(i64::checked_neg)
            }
            _ => None,
        }
    }

    /// Interpret the s-expression as a Boolean value.
    pub fn bool(&self) -> Option<bool> {
        match self.atom_s() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        }
    }

    /// Return the head and tail if self is of the form `(head rest..)`.
    pub fn app(&self) -> Option<(&str, &[Sexp])> {
        self.list().and_then(|ss| {
            if !ss.is_empty() {
                if let Some(head) = ss[0].atom_s() {
                    return Some((head, &ss[1..]));
                }
            }
            None
        })
    }

    /// Whether this is a comment.
    pub fn is_comment(&self) -> bool {
        matches!(self, Sexp::Comment(_))
    }
}

peg::parser! {
grammar parser() for str {
  rule ident_start() = ['a'..='z' | 'A'..='Z' | '_' | '\'' | '<' | '>' | ':' | '=' | '$' | '@' | '+' | '-' | '*' | '~' | '^' | '&' | '/' | '?' | '.']
  rule ident_char() = ident_start() / ['0'..='9' | '!' | '#' | '%']
  rule ident() = quiet! { ident_start() ident_char()* } / expected!("atom")

  rule whitespace() = [' ' | '\t' | '\n' | '\r']
  rule _ = whitespace()*

  rule quoted_atom() -> Atom
  = "\"" s:$([^'"']*) "\"" { Atom::S(s.to_string()) }

  rule pipe_quoted_atom() -> Atom
  = "|" s:$([^'|']*) "|" { Atom::S(s.to_string()) }

  rule unquoted_atom() -> Atom
  = s:$(ident()) { Atom::S(s.to_string()) }

  rule int_atom() -> Atom
  = i:$(['0'..='9']+) {? i.parse().map(Atom::I).or(Err("numeral that fits in 64 bits")) }

  rule atom() -> Sexp
  = s:(quoted_atom() /
       pipe_quoted_atom() /
       unquoted_atom() /
       int_atom()) { Sexp::Atom(s) }

  rule comment() -> Sexp
  = ";" s:$(([^'\n']*)) ("\n" / ![_]) { Sexp::Comment(s.to_string()) }

  rule list() -> Sexp
  = "(" _ ss:(sexp() ** _) _ ")" { Sexp::List(ss) }

  rule sexp() -> Sexp
  = atom() / comment() / list()

  /// Parse an sexp but be tolerant to whitespace around it.
  pub(super) rule sexp_whitespace() -> Sexp
  = _ s:sexp() _ { s }

  /// Parse a sequence of sexps.
  pub(super) rule sexps() -> Vec<Sexp>
  = _ ss:(sexp() ** _) _ { ss }

  rule spanned() -> (Range<usize>, Sexp)
  = start:position!() s:sexp() end:position!() { (start..end, s) }

  /// Parse a sequence of sexps, tracking the byte range of each.
  pub(super) rule spanned_sexps() -> Vec<(Range<usize>, Sexp)>
  = _ ss:(spanned() ** _) _ { ss }
}
}

/// Parse an sexp.
///
/// Allows whitespace before or after.
pub fn parse(s: &str) -> Result<Sexp, peg::error::ParseError<LineCol>> {
    parser::sexp_whitespace(s)
}

/// Parse a sequence of sexps, separated by whitespace.
pub fn parse_many(s: &str) -> Result<Vec<Sexp>, peg::error::ParseError<LineCol>> {
    parser::sexps(s)
}

/// Parse a sequence of sexps, returning each one with the byte range of the
/// input it was parsed from.
pub fn parse_many_spanned(
    s: &str,
) -> Result<Vec<(Range<usize>, Sexp)>, peg::error::ParseError<LineCol>> {
    parser::spanned_sexps(s)
}

impl Sexp {
    /// Remove comments anywhere inside the s-expression.
    ///
    /// Returns None if self is itself a comment.
    pub fn without_comments(&self) -> Option<Sexp> {
        match self {
            Sexp::Atom(_) => Some(self.clone()),
            Sexp::Comment(_) => None,
            Sexp::List(ss) => Some(Sexp::List(
                ss.iter().filter_map(Sexp::without_comments).collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{app, atom_i, atom_s, int, parse, parse_many, parse_many_spanned, sexp_l, Sexp};

    #[test]
    fn test_parsing() {
        assert_eq!(
            parse("(foo  a (bar () 1))"),
            Ok(app(
                "foo",
                [atom_s("a"), app("bar", [sexp_l([]), atom_i(1)])]
            ))
        );
    }

    #[test]
    fn test_printing() {
        let e = parse(
            r#"(hello a b c (there
            ; here's a comment
            (friend)))
            "#,
        )
        .unwrap();
        insta::assert_snapshot!(e, @r#"
        (hello a b c (there
        ; here's a comment
        (friend)))
        "#);
    }

    #[test]
    fn test_sygus_identifiers() {
        let e = parse("(define-fun trans-f ((x Int) (x! Int)) Bool (= x! (+ x 1)))").unwrap();
        let (head, args) = e.app().unwrap();
        assert_eq!(head, "define-fun");
        assert_eq!(args[0].atom_s(), Some("trans-f"));
        assert_eq!(args[1].list().unwrap()[1], app("x!", [atom_s("Int")]));
    }

    #[test]
    fn test_app_arguments() {
        assert_eq!(app("check-sat", []).to_string(), "(check-sat)");
        let names = ["x", "y"];
        assert_eq!(
            app("get-value", [sexp_l(names.iter().map(|n| atom_s(*n)))]).to_string(),
            "(get-value (x y))"
        );
        assert_eq!(
            app("and", vec![atom_s("p"), int(-1)]).to_string(),
            "(and p (- 1))"
        );
    }

    #[test]
    fn test_signed_values() {
        assert_eq!(parse("(- 12)").unwrap().int(), Some(-12));
        assert_eq!(parse("7").unwrap().int(), Some(7));
        assert_eq!(parse("x").unwrap().int(), None);
        assert_eq!(int(-3).to_string(), "(- 3)");
        assert_eq!(int(3).to_string(), "3");
        assert_eq!(parse("true").unwrap().bool(), Some(true));
    }

    #[test]
    fn test_get_value_response() {
        let e = parse("((x 11) (|x'| (- 2)))").unwrap();
        let pairs = e.list().unwrap();
        assert_eq!(pairs[1].list().unwrap()[0].atom_s(), Some("x'"));
        assert_eq!(pairs[1].list().unwrap()[1].int(), Some(-2));
        // printing quotes the primed name again
        assert_eq!(e.to_string(), "((x 11) (|x'| (- 2)))");
    }

    #[test]
    fn test_numeral_overflow_is_an_error() {
        assert!(parse("123456789012345678901234567890").is_err());
    }

    #[test]
    fn test_parse_many_with_trailing_comment() {
        let es = parse_many("(a) ; done").unwrap();
        assert_eq!(es.len(), 2);
        assert!(matches!(es[1], Sexp::Comment(_)));
    }

    #[test]
    fn test_spans_and_comment_removal() {
        let src = "(set-logic LIA)\n; a comment\n(f (g ; inner\n x))";
        let es = parse_many_spanned(src).unwrap();
        assert_eq!(es.len(), 3);
        assert_eq!(&src[es[0].0.clone()], "(set-logic LIA)");
        assert!(es[1].1.is_comment());
        let last = es[2].1.without_comments().unwrap();
        assert_eq!(last, parse("(f (g x))").unwrap());
        assert_eq!(es[1].1.without_comments(), None);
    }

    #[test]
    fn test_roundtrip_parsing() {
        for s in [
            r#"|also has a space|"#,
            r#"(forall ((x Int)) (=> (>= x 0) (> (+ x 1) 0)))"#,
        ] {
            let e = parse(s).unwrap_or_else(|_| panic!("`{s}` did not parse"));
            assert_eq!(
                parse(&e.to_string()).unwrap(),
                e,
                "`{s}` does not roundtrip",
            );
        }
    }
}
