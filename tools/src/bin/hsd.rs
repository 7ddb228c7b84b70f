//! # `hsd`
//!
//! Model-based diagnosis of a system description with multiple observations,
//! using implicit hitting set duality. The input is an observation-annotated
//! WCNF file: hard clauses form the system description, soft clauses define
//! the components and `o` lines give the observations.

use std::{fmt, io, path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context;
use clap::{ArgAction, Parser};
use cpu_time::ProcessTime;
use itertools::Itertools;
use rustsat::types::RsHashMap;
use rustsat_hsd::{
    coex::{self, Reduction},
    diagnose::{self, Diagnoser, Limit, Outcome, Report},
    hitman::{self, McsAlgorithm},
    instances::{fio::mwcnf::Mwcnf, Problem},
    types::{Cost, Element},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The path to the input file. If no path is given, will read from `stdin`.
    in_path: Option<PathBuf>,
    /// Seed the enumerator with disjoint counterexamples
    #[arg(short, long)]
    bootstrap: bool,
    /// After each diagnosis, check whether the observations can still be
    /// explained at all
    #[arg(short = 'c', long)]
    check_more: bool,
    /// How often to trim unsat cores of the counterexample oracle
    #[arg(long, default_value_t = 0)]
    ctrim: usize,
    /// The number of diagnoses to compute: a number, `all` or `best`
    #[arg(short, long = "enum", default_value_t = Limit::default())]
    enumerate: Limit,
    /// How to reduce counterexamples: `none`, `lin` or `qxp`
    #[arg(short, long, default_value_t = Reduction::default())]
    reduce_coex: Reduction,
    /// Compute minimum-weight diagnoses instead of set-minimal ones
    #[arg(short, long)]
    sorted: bool,
    /// How often to trim unsat cores of the hitting set enumerator
    #[arg(long, default_value_t = 0)]
    trim: usize,
    /// CPU time limit in seconds
    #[arg(short, long)]
    timeout: Option<u64>,
    /// Reduce counterexamples against all observations
    #[arg(short = 'x', long)]
    ex_reduce: bool,
    /// Derive the next minimum hitting set from the previous one if possible
    #[arg(long)]
    one_call: bool,
    /// Use clause D checks when computing minimal hitting sets
    #[arg(long)]
    clause_d: bool,
    /// The MCS algorithm for minimal hitting sets
    #[arg(long, default_value_t = McsAlgorithm::default())]
    mcs: McsAlgorithm,
    /// Increase the verbosity, can be repeated
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn options(&self) -> diagnose::Options {
        diagnose::Options {
            sorted: self.sorted,
            limit: self.enumerate,
            bootstrap: self.bootstrap,
            check_more: self.check_more,
            cpu_limit: self.timeout.filter(|&t| t > 0).map(Duration::from_secs),
            hitman: hitman::Params {
                algorithm: self.mcs,
                clause_d: self.clause_d,
                trim: self.trim,
                one_call: self.one_call,
            },
            coex: coex::Options {
                reduction: self.reduce_coex,
                trim: self.ctrim,
                exhaustive: self.ex_reduce,
            },
        }
    }
}

/// Prints the progress of the diagnosis loop as comment and solution lines,
/// with components given by their position in the input
struct Printer<W> {
    out: W,
    indices: RsHashMap<Element, usize>,
    sorted: bool,
    verbosity: u8,
    /// The first error writing to `out`
    error: Option<io::Error>,
}

impl<W: io::Write> Printer<W> {
    fn new(out: W, indices: RsHashMap<Element, usize>, sorted: bool, verbosity: u8) -> Self {
        Self {
            out,
            indices,
            sorted,
            verbosity,
            error: None,
        }
    }

    fn line(&mut self, line: fmt::Arguments<'_>) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = writeln!(self.out, "{line}") {
            self.error = Some(err);
        }
    }

    fn print_set(&mut self, prefix: &str, set: &[Element]) {
        let ids = set
            .iter()
            .map(|el| self.indices.get(el).copied().unwrap_or_default())
            .chain(std::iter::once(0))
            .join(" ");
        self.line(format_args!("c {prefix}: {ids}"));
    }

    /// Returns the first write error, if any
    fn finish(self) -> io::Result<()> {
        self.error.map_or(Ok(()), Err)
    }
}

impl<W: io::Write> Report for Printer<W> {
    fn candidate(&mut self, candidate: &[Element], _cost: Cost) {
        if self.verbosity > 1 {
            self.print_set("C", candidate);
        }
    }

    fn bound(&mut self, cost: Cost, iterations: usize) {
        if self.verbosity > 0 {
            self.line(format_args!("c cost: {cost}; iters: {iterations}"));
        }
    }

    fn counterexample(&mut self, coex: &[Element], failure_id: usize) {
        if self.verbosity > 0 {
            self.print_set("E", coex);
            self.line(format_args!("c O: {failure_id}"));
        }
    }

    fn diagnosis(&mut self, diagnosis: &[Element], cost: Cost, first: bool) {
        if first && self.sorted {
            self.line(format_args!("s OPTIMUM FOUND"));
            self.line(format_args!("o {cost}"));
        }
        self.print_set("D", diagnosis);
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let start = ProcessTime::now();
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let problem = match &args.in_path {
        Some(path) => Problem::from_path(path)
            .with_context(|| format!("failed to parse {}", path.display()))?,
        None => Problem::from_mwcnf(
            Mwcnf::from_reader(io::stdin().lock()).context("failed to parse stdin")?,
        ),
    };
    println!("c # of system cls: {}", problem.system.len());
    println!("c # of components: {}", problem.selectors.len());
    println!("c # of observations: {}", problem.observations.len());

    let mut printer = Printer::new(
        io::stdout().lock(),
        problem.component_indices(),
        args.sorted,
        args.verbose,
    );
    let mut diagnoser = Diagnoser::<rustsat_hsd_tools::Solver>::new(&problem, args.options())?;
    let summary = diagnoser.run(&mut printer)?;
    printer.finish()?;

    match summary.outcome {
        Outcome::NoSolution => println!("s NO SOLUTION"),
        Outcome::Optimum { cost } if summary.diagnoses.is_empty() => {
            println!("s OPTIMUM FOUND");
            println!("o {cost}");
        }
        Outcome::TimedOut => println!("c timeout"),
        Outcome::Optimum { .. } | Outcome::Enumerated => (),
    }
    println!("c # of iters: {}", summary.stats.iterations);
    println!("c # of diags: {}", summary.stats.diagnoses);
    println!("c # of expls: {}", summary.stats.counterexamples);
    println!("c cpu time: {:.2}", start.elapsed().as_secs_f64());

    if summary.outcome == Outcome::TimedOut {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use rustsat::types::RsHashMap;
    use rustsat_hsd::diagnose::Report;

    use super::Printer;

    fn new_printer(sorted: bool, verbosity: u8) -> Printer<Vec<u8>> {
        let indices: RsHashMap<i32, usize> = [(4, 1), (5, 2), (6, 3)].into_iter().collect();
        Printer::new(vec![], indices, sorted, verbosity)
    }

    fn output(printer: Printer<Vec<u8>>) -> String {
        String::from_utf8(printer.out).unwrap()
    }

    #[test]
    fn quiet_progress() {
        let mut printer = new_printer(true, 0);
        printer.bound(2, 5);
        printer.candidate(&[4, 6], 2);
        printer.counterexample(&[5], 1);
        printer.diagnosis(&[4, 6], 2, true);
        printer.diagnosis(&[5, 6], 2, false);
        assert_eq!(
            output(printer),
            "s OPTIMUM FOUND\no 2\nc D: 1 3 0\nc D: 2 3 0\n"
        );
    }

    #[test]
    fn verbose_progress() {
        let mut printer = new_printer(true, 1);
        printer.bound(2, 5);
        printer.candidate(&[4, 6], 2);
        printer.counterexample(&[5], 1);
        assert_eq!(output(printer), "c cost: 2; iters: 5\nc E: 2 0\nc O: 1\n");

        let mut printer = new_printer(false, 2);
        printer.candidate(&[4], 1);
        printer.diagnosis(&[4], 1, true);
        assert_eq!(output(printer), "c C: 1 0\nc D: 1 0\n");
    }
}
