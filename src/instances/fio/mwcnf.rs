//! # Parsing Observation-Annotated WCNF Files
//!
//! The diagnosis input format is weighted DIMACS CNF extended with
//! observation lines. A file consists of
//!
//! - comment lines starting with `c`,
//! - an optional header `p wcnf <n_vars> <n_clauses> [<top>]`,
//! - weighted clauses `<weight> <lits> 0`,
//! - hard clauses `h <lits> 0` (as in WCNF files without header), and
//! - observations `o <lits> 0`, each a conjunction of literals.
//!
//! With a header, clauses of weight at least `top` are hard and weights above
//! `top` are clamped. A top weight of 1 cannot tell hard and soft clauses
//! apart, so all clauses are treated as soft. Without a header, only `h`
//! clauses are hard.
//!
//! Like the DIMACS parser of RustSAT, the parser accepts inputs that are not
//! strictly in format as long as they are still reasonable.

use std::{
    cmp,
    io::{self, BufRead},
    path::Path,
};

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{i32, line_ending, multispace0, multispace1, u64},
    combinator::{all_consuming, map_res, opt, recognize, success},
    error::{Error as NomError, ErrorKind, ParseError},
    multi::separated_list0,
    sequence::{pair, preceded, terminated, tuple},
    IResult,
};
use rustsat::types::{Clause, Lit, Var};
use thiserror::Error;

/// The weight of a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    /// The clause must be satisfied
    Hard,
    /// The clause may be violated at the given cost
    Soft(usize),
}

/// The content of an input file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mwcnf {
    /// The clauses in file order
    pub clauses: Vec<(Weight, Clause)>,
    /// The observations in file order
    pub observations: Vec<Vec<Lit>>,
    /// The largest variable appearing in the file
    pub max_var: Option<Var>,
}

impl Mwcnf {
    /// Parses an input file from a reader
    ///
    /// # Errors
    ///
    /// Parsing errors.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        parse_mwcnf(reader)
    }

    /// Parses an input file from a path. With feature `compression`, `.bz2`,
    /// `.gz` and `.xz` files are decompressed on the fly.
    ///
    /// # Errors
    ///
    /// IO or parsing errors.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let reader = super::open_compressed_uncompressed_read(path).map_err(Error::IOError)?;
        parse_mwcnf(reader)
    }

    fn add_clause(&mut self, weight: Weight, clause: Clause) {
        self.track_vars(clause.iter());
        self.clauses.push((weight, clause));
    }

    fn add_observation(&mut self, lits: Vec<Lit>) {
        self.track_vars(lits.iter());
        self.observations.push(lits);
    }

    fn track_vars<'a, I: Iterator<Item = &'a Lit>>(&mut self, lits: I) {
        for lit in lits {
            self.max_var = Some(match self.max_var {
                Some(max) => cmp::max(max, lit.var()),
                None => lit.var(),
            });
        }
    }
}

/// Errors occuring within the input file parsing module
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid literal in the file
    #[error("invalid literal: {0}")]
    Lit(String),
    /// Invalid ending of a clause
    #[error("invalid clause ending: {0}")]
    ClauseEnding(String),
    /// Invalid weight
    #[error("invalid weight: {0}")]
    Weight(String),
    /// P line value is too large to fit in a [`usize`]
    #[error("value in p-line too large to fit usize: {0}")]
    PValTooLarge(u64),
    /// Invalid or repeated p line
    #[error("invalid p-line: {0}")]
    PLine(String),
    /// IO error reading file
    #[error("IO error: {0}")]
    IOError(io::Error),
    /// Base error from nom parsing
    #[error("nom error: {0} ({1:?})")]
    NomError(String, ErrorKind),
    /// Incomplete nom error
    #[error("nom parser requested more data")]
    NomIncomplete,
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Lit(l0), Self::Lit(r0))
            | (Self::ClauseEnding(l0), Self::ClauseEnding(r0))
            | (Self::Weight(l0), Self::Weight(r0))
            | (Self::PLine(l0), Self::PLine(r0)) => l0 == r0,
            (Self::PValTooLarge(l0), Self::PValTooLarge(r0)) => l0 == r0,
            (Self::IOError(_), Self::IOError(_)) => true,
            (Self::NomError(l0, l1), Self::NomError(r0, r1)) => l0 == r0 && l1 == r1,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl ParseError<&str> for Error {
    fn from_error_kind(input: &str, kind: ErrorKind) -> Self {
        Self::NomError(String::from(input), kind)
    }

    fn append(_: &str, _: ErrorKind, other: Self) -> Self {
        // Other error always has precedence. This should prefer more meaningful
        // errors than [`Error::NomError`]
        other
    }
}

/// A parsed line
#[derive(Debug, PartialEq, Eq)]
enum Line {
    /// Comment or empty line
    Skip,
    /// Header with the optional top weight
    Header(Option<usize>),
    Observation(Vec<Lit>),
    Hard(Clause),
    Soft(usize, Clause),
}

fn unwrap_nom_error(err: nom::Err<Error>) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::NomIncomplete,
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
    }
}

/// Top level parser
fn parse_mwcnf<R: BufRead>(mut reader: R) -> Result<Mwcnf, Error> {
    let mut inst = Mwcnf::default();
    // `None` without header, `Some(None)` for a header without top
    let mut header: Option<Option<usize>> = None;
    let mut buf = String::new();
    loop {
        buf.clear();
        if reader.read_line(&mut buf).map_err(Error::IOError)? == 0 {
            return Ok(inst);
        }
        let (_, line) = parse_line(&buf).map_err(unwrap_nom_error)?;
        match line {
            Line::Skip => (),
            Line::Header(top) => {
                if header.is_some() {
                    return Err(Error::PLine(buf.clone()));
                }
                header = Some(top);
            }
            Line::Observation(lits) => inst.add_observation(lits),
            Line::Hard(clause) => inst.add_clause(Weight::Hard, clause),
            Line::Soft(weight, clause) => {
                let weight = match header {
                    Some(Some(1)) | None => Weight::Soft(weight),
                    Some(Some(top)) if weight >= top => Weight::Hard,
                    Some(_) => Weight::Soft(weight),
                };
                inst.add_clause(weight, clause);
            }
        }
    }
}

/// Parses one line of the file
fn parse_line(input: &str) -> IResult<&str, Line, Error> {
    let (input, _) = multispace0(input)?;
    if input.trim().is_empty() {
        // Tolerate empty lines
        return Ok((input, Line::Skip));
    }
    if let Ok((input, _)) = tag::<&str, &str, NomError<&str>>("c")(input) {
        return Ok((input, Line::Skip));
    }
    if input.starts_with('p') {
        return parse_p_line(input);
    }
    if let Ok((input, _)) = tag::<&str, &str, NomError<&str>>("o")(input) {
        let (input, lits) = preceded(multispace0, parse_lits)(input)?;
        return Ok((input, Line::Observation(lits)));
    }
    if let Ok((input, _)) = terminated(tag::<&str, &str, NomError<&str>>("h"), multispace1)(input)
    {
        let (input, lits) = parse_lits(input)?;
        return Ok((input, Line::Hard(Clause::from_iter(lits))));
    }
    let (input, (weight, _, lits)) = tuple((parse_weight, multispace1, parse_lits))(input)?;
    Ok((input, Line::Soft(weight, Clause::from_iter(lits))))
}

/// Parses the header line
fn parse_p_line(input: &str) -> IResult<&str, Line, Error> {
    let full_p_line = String::from(input);
    let (input, (n_vars, _, n_clauses, top)) = preceded(
        tuple::<_, _, NomError<_>, _>((tag("p"), multispace1, tag("wcnf"), multispace1)),
        tuple((u64, multispace1, u64, opt(preceded(multispace1, u64)))),
    )(input)
    .map_err(|e| e.map(|_| Error::PLine(full_p_line.clone())))?;
    for val in [n_vars, n_clauses] {
        if usize::try_from(val).is_err() {
            return Err(nom::Err::Error(Error::PValTooLarge(val)));
        }
    }
    let top = match top {
        Some(top) => match usize::try_from(top) {
            Ok(top) => Some(top),
            Err(_) => return Err(nom::Err::Error(Error::PValTooLarge(top))),
        },
        None => None,
    };
    Ok((input, Line::Header(top)))
}

/// Parses a zero-terminated list of literals
fn parse_lits(input: &str) -> IResult<&str, Vec<Lit>, Error> {
    terminated(separated_list0(multispace1, parse_lit), parse_clause_ending)(input)
}

/// Nuclear parser for weight value
fn parse_weight(input: &str) -> IResult<&str, usize, Error> {
    map_res(u64, usize::try_from)(input)
        .map_err(|e| e.map(|e: NomError<&str>| Error::Weight(String::from(e.input))))
}

/// Nuclear parser for literal
fn parse_lit(input: &str) -> IResult<&str, Lit, Error> {
    map_res(i32, Lit::from_ipasir)(input)
        .map_err(|e| e.map(|e: NomError<&str>| Error::Lit(String::from(e.input))))
}

/// Parses the end of a clause
/// A '0' followed by a linebreak, as well as a '0' followed by
/// whitespace or only a linebreak are treated as valid clause endings.
fn parse_clause_ending(input: &str) -> IResult<&str, &str, Error> {
    recognize(pair(
        multispace0,
        alt((
            recognize(all_consuming(success(""))),
            recognize(all_consuming(tag("0"))),
            recognize(terminated(tag("0"), line_ending)),
            recognize(terminated(tag("0"), multispace1)),
            recognize(line_ending),
        )),
    ))(input)
    .map_err(|e| e.map(|e: NomError<&str>| Error::ClauseEnding(String::from(e.input))))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rustsat::{clause, ipasir_lit, var};

    use super::{
        parse_clause_ending, parse_line, parse_lit, parse_mwcnf, parse_p_line, parse_weight,
        Error, Line, Mwcnf, Weight,
    };

    #[test]
    fn parse_lit_pass() {
        assert_eq!(parse_lit("5 "), Ok((" ", ipasir_lit![5])));
        assert_eq!(parse_lit("-3 0"), Ok((" 0", ipasir_lit![-3])));
    }

    #[test]
    fn parse_lit_fail() {
        assert_eq!(
            parse_lit("0 "),
            Err(nom::Err::Error(Error::Lit(String::from("0 "))))
        );
        assert_eq!(
            parse_lit("x1 "),
            Err(nom::Err::Error(Error::Lit(String::from("x1 "))))
        );
    }

    #[test]
    fn parse_weight_pass() {
        assert_eq!(parse_weight("15 "), Ok((" ", 15)));
        assert_eq!(parse_weight("0 1"), Ok((" 1", 0)));
    }

    #[test]
    fn parse_weight_fail() {
        assert_eq!(
            parse_weight("-15 "),
            Err(nom::Err::Error(Error::Weight(String::from("-15 "))))
        );
    }

    #[test]
    fn parse_clause_ending_pass() {
        assert_eq!(parse_clause_ending(" 0\n"), Ok(("", " 0\n")));
        assert_eq!(parse_clause_ending("0 "), Ok(("", "0 ")));
        assert_eq!(parse_clause_ending("\n"), Ok(("", "\n")));
    }

    #[test]
    fn parse_p_line_pass() {
        assert_eq!(
            parse_p_line("p wcnf 7 10 42\n"),
            Ok(("\n", Line::Header(Some(42))))
        );
        assert_eq!(parse_p_line("p wcnf 7 10\n"), Ok(("\n", Line::Header(None))));
    }

    #[test]
    fn parse_p_line_fail() {
        assert_eq!(
            parse_p_line("p cnf 7 10\n"),
            Err(nom::Err::Error(Error::PLine(String::from("p cnf 7 10\n"))))
        );
    }

    #[test]
    fn parse_lines() {
        assert_eq!(parse_line("c comment\n").unwrap().1, Line::Skip);
        assert_eq!(parse_line("   \n").unwrap().1, Line::Skip);
        assert_eq!(
            parse_line("o 4 -7 0\n").unwrap().1,
            Line::Observation(vec![ipasir_lit![4], ipasir_lit![-7]])
        );
        assert_eq!(parse_line("o 0\n").unwrap().1, Line::Observation(vec![]));
        assert_eq!(
            parse_line("h -1 5 0\n").unwrap().1,
            Line::Hard(clause![ipasir_lit![-1], ipasir_lit![5]])
        );
        assert_eq!(
            parse_line("3 2 0\n").unwrap().1,
            Line::Soft(3, clause![ipasir_lit![2]])
        );
    }

    #[test]
    fn parse_with_header() {
        let data = "c test\np wcnf 7 5 10\n10 -1 -4 5 0\n12 -1 4 -5 0\n1 1 0\n2 2 3 0\no 4 -7 0\n";
        let inst = parse_mwcnf(Cursor::new(data)).unwrap();
        assert_eq!(
            inst.clauses,
            vec![
                (
                    Weight::Hard,
                    clause![ipasir_lit![-1], ipasir_lit![-4], ipasir_lit![5]]
                ),
                (
                    Weight::Hard,
                    clause![ipasir_lit![-1], ipasir_lit![4], ipasir_lit![-5]]
                ),
                (Weight::Soft(1), clause![ipasir_lit![1]]),
                (Weight::Soft(2), clause![ipasir_lit![2], ipasir_lit![3]]),
            ]
        );
        assert_eq!(inst.observations, vec![vec![ipasir_lit![4], ipasir_lit![-7]]]);
        assert_eq!(inst.max_var, Some(var![6]));
    }

    #[test]
    fn parse_top_one() {
        let data = "p wcnf 2 2 1\n1 1 0\n1 -1 2 0\n";
        let inst = parse_mwcnf(Cursor::new(data)).unwrap();
        assert!(inst
            .clauses
            .iter()
            .all(|(weight, _)| *weight == Weight::Soft(1)));
    }

    #[test]
    fn parse_without_header() {
        let data = "h 1 2 0\n3 -2 0\no -1 0\n";
        let inst = parse_mwcnf(Cursor::new(data)).unwrap();
        assert_eq!(
            inst,
            Mwcnf {
                clauses: vec![
                    (Weight::Hard, clause![ipasir_lit![1], ipasir_lit![2]]),
                    (Weight::Soft(3), clause![ipasir_lit![-2]]),
                ],
                observations: vec![vec![ipasir_lit![-1]]],
                max_var: Some(var![1]),
            }
        );
    }

    #[test]
    fn parse_repeated_header() {
        let data = "p wcnf 2 2 3\np wcnf 2 2 3\n";
        assert_eq!(
            parse_mwcnf(Cursor::new(data)),
            Err(Error::PLine(String::from("p wcnf 2 2 3\n")))
        );
    }
}
