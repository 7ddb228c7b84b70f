//! # The Diagnosis Loop
//!
//! [`Diagnoser`] alternates between a [`Hitman`] proposing candidate
//! diagnoses and a [`CoexFinder`] refuting them. Every counterexample is added
//! to the hitting set enumerator as a set to hit; every candidate without
//! counterexample is a diagnosis.
//!
//! ```
//! use rustsat::{clause, instances::Cnf, ipasir_lit};
//! use rustsat_hsd::{
//!     diagnose::{Diagnoser, Limit, NoReport, Options, Outcome},
//!     instances::Problem,
//! };
//! use rustsat_minisat::core::Minisat;
//!
//! // component 1 is an inverter from 2 to 3
//! let mut system = Cnf::new();
//! system.add_clause(clause![ipasir_lit![-1], ipasir_lit![2], ipasir_lit![3]]);
//! system.add_clause(clause![ipasir_lit![-1], ipasir_lit![-2], ipasir_lit![-3]]);
//! let observations = vec![vec![ipasir_lit![2], ipasir_lit![3]]];
//! let problem = Problem::new(system, vec![1], observations).unwrap();
//!
//! let opts = Options {
//!     limit: Limit::All,
//!     ..Options::default()
//! };
//! let mut diagnoser = Diagnoser::<Minisat>::new(&problem, opts).unwrap();
//! let summary = diagnoser.run(&mut NoReport).unwrap();
//! assert_eq!(summary.outcome, Outcome::Enumerated);
//! assert_eq!(summary.diagnoses, vec![vec![1]]);
//! ```

use std::{fmt, str::FromStr, time::Duration};

use cpu_time::ProcessTime;
use rustsat::solvers::SolveIncremental;

use crate::{
    coex::{self, CoexFinder},
    hitman::{self, Hitman},
    instances::Problem,
    types::{Cost, Element},
    DisplaySet, Error,
};

/// How many diagnoses to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Stop after the given number of diagnoses. Zero is treated as one.
    Count(usize),
    /// Enumerate all diagnoses
    All,
    /// Enumerate all diagnoses of the cost of the first one
    Best,
}

impl Default for Limit {
    fn default() -> Self {
        Limit::Count(1)
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Count(n) => write!(f, "{n}"),
            Limit::All => write!(f, "all"),
            Limit::Best => write!(f, "best"),
        }
    }
}

impl FromStr for Limit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Limit::All),
            "best" => Ok(Limit::Best),
            _ => s.parse().map(Limit::Count).map_err(|_| Error::InvalidValue {
                what: "enumeration limit",
                value: s.to_string(),
            }),
        }
    }
}

/// Options of the diagnosis loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    /// Enumerate minimum-weight instead of set-minimal candidates
    pub sorted: bool,
    /// When to stop enumerating diagnoses
    pub limit: Limit,
    /// Seed the enumerator with disjoint counterexamples
    pub bootstrap: bool,
    /// Block every diagnosis in the counterexample oracle and stop once no
    /// observation can be explained anymore
    pub check_more: bool,
    /// Limit on the CPU time of the process
    pub cpu_limit: Option<Duration>,
    /// Parameters of the hitting set enumerator
    pub hitman: hitman::Params,
    /// Options of the counterexample finder
    pub coex: coex::Options,
}

/// A CPU time deadline that is checked between rounds
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: ProcessTime,
    limit: Option<Duration>,
}

impl Deadline {
    /// Starts the clock
    #[must_use]
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            start: ProcessTime::now(),
            limit,
        }
    }

    /// The CPU time used since the deadline was started
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Whether the limit has been reached
    #[must_use]
    pub fn expired(&self) -> bool {
        self.limit.is_some_and(|limit| self.elapsed() >= limit)
    }
}

/// Hooks for observing the progress of the diagnosis loop. All hooks do
/// nothing by default.
pub trait Report {
    /// A candidate was proposed by the enumerator
    fn candidate(&mut self, _candidate: &[Element], _cost: Cost) {}

    /// The cost of the candidates increased (sorted mode only)
    fn bound(&mut self, _cost: Cost, _iterations: usize) {}

    /// A counterexample was found for the observation with the given 1-based
    /// index
    fn counterexample(&mut self, _coex: &[Element], _failure_id: usize) {}

    /// A diagnosis was found. `first` is set for the first diagnosis.
    fn diagnosis(&mut self, _diagnosis: &[Element], _cost: Cost, _first: bool) {}
}

/// A reporter that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReport;

impl Report for NoReport {}

/// Counters of the diagnosis loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Candidates checked
    pub iterations: usize,
    /// Diagnoses found
    pub diagnoses: usize,
    /// Counterexamples hit, including the ones found while bootstrapping
    pub counterexamples: usize,
}

/// How the diagnosis loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// There is no diagnosis
    NoSolution,
    /// Minimum-weight diagnoses were found; `cost` is the optimum
    Optimum {
        /// The weight of the first diagnosis
        cost: Cost,
    },
    /// Set-minimal diagnoses were found
    Enumerated,
    /// The CPU time limit was reached
    TimedOut,
}

/// The result of the diagnosis loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// How the loop ended
    pub outcome: Outcome,
    /// The diagnoses in the order they were found, each in ascending order
    pub diagnoses: Vec<Vec<Element>>,
    /// The final counters
    pub stats: Stats,
}

/// Runs the implicit hitting set loop on a problem with SAT oracles of type
/// `O`
#[derive(Debug)]
pub struct Diagnoser<O> {
    coex: CoexFinder<O>,
    hitman: Hitman<O>,
    weights: Vec<(Element, Cost)>,
    opts: Options,
    deadline: Deadline,
    stats: Stats,
    diagnoses: Vec<Vec<Element>>,
}

impl<O> Diagnoser<O>
where
    O: SolveIncremental + Default,
{
    /// Sets up the oracles for a problem and starts the deadline
    ///
    /// # Errors
    ///
    /// - [`Error::BestRequiresSorted`] if [`Limit::Best`] is used with the
    ///   set-minimal strategy
    /// - invalid selectors or oracle errors
    pub fn new(problem: &Problem, opts: Options) -> anyhow::Result<Self> {
        if opts.limit == Limit::Best && !opts.sorted {
            return Err(Error::BestRequiresSorted.into());
        }
        let deadline = Deadline::new(opts.cpu_limit);
        let coex = CoexFinder::from_problem(problem, opts.coex)?;
        let hitman = if opts.sorted {
            Hitman::minimum(opts.hitman)
        } else {
            Hitman::minimal(opts.hitman)
        };
        let weights = if opts.sorted && problem.is_weighted() {
            problem.weighted_selectors().collect()
        } else {
            vec![]
        };
        Ok(Self {
            coex,
            hitman,
            weights,
            opts,
            deadline,
            stats: Stats::default(),
            diagnoses: vec![],
        })
    }

    /// Runs the diagnosis loop until the limit is reached, no further
    /// diagnosis exists or the deadline expires
    ///
    /// # Errors
    ///
    /// Oracle errors or an unsupported MCS algorithm.
    pub fn run<R: Report>(&mut self, reporter: &mut R) -> anyhow::Result<Summary> {
        if !self.coex.check(false)? {
            tracing::info!("system description is inconsistent");
            return Ok(self.summary(Outcome::NoSolution));
        }
        if self.coex.check(true)? {
            tracing::info!("observations are consistent with the healthy system");
            return Ok(self.summary(Outcome::Optimum { cost: 0 }));
        }

        if !self.weights.is_empty() {
            self.hitman.weigh(self.weights.iter().copied());
        }

        if self.opts.bootstrap && !self.bootstrap(reporter)? {
            return Ok(self.summary(Outcome::TimedOut));
        }

        let outcome = self.search(reporter)?;
        tracing::info!(
            hitman_calls = self.hitman.n_oracle_calls(),
            coex_calls = self.coex.n_oracle_calls(),
            cpu_time = ?self.deadline.elapsed(),
            "diagnosis finished"
        );
        Ok(self.summary(outcome))
    }

    /// Hits counterexamples of the union of all previous counterexamples,
    /// which yields pairwise disjoint sets. Returns `false` if the deadline
    /// expired.
    fn bootstrap<R: Report>(&mut self, reporter: &mut R) -> anyhow::Result<bool> {
        let mut faulty = vec![];
        let mut disjoint = 0;
        loop {
            if self.deadline.expired() {
                return Ok(false);
            }
            let coex = self.coex.get(&faulty)?;
            if coex.is_empty() {
                break;
            }
            if let Some(failure_id) = self.coex.failure_id() {
                reporter.counterexample(&coex, failure_id);
            }
            faulty.extend_from_slice(&coex);
            faulty.sort_unstable();
            self.hitman.hit(&coex)?;
            self.stats.counterexamples += 1;
            disjoint += 1;
        }
        tracing::info!(disjoint, "bootstrapped counterexamples");
        Ok(true)
    }

    fn search<R: Report>(&mut self, reporter: &mut R) -> anyhow::Result<Outcome> {
        let max_diagnoses = match self.opts.limit {
            Limit::Count(n) => Some(n.max(1)),
            Limit::All | Limit::Best => None,
        };
        let mut first_cost = None;
        let mut curr_cost = 0;

        loop {
            if self.deadline.expired() {
                tracing::info!("CPU time limit reached");
                return Ok(Outcome::TimedOut);
            }

            let mut candidate = self.hitman.get()?;
            let Some(cost) = self.hitman.cost() else {
                tracing::debug!("enumerator exhausted");
                break;
            };
            if self.opts.limit == Limit::Best && first_cost.is_some_and(|best| cost > best) {
                break;
            }
            if self.opts.sorted && cost > curr_cost {
                curr_cost = cost;
                reporter.bound(cost, self.stats.iterations);
            }

            candidate.sort_unstable();
            tracing::debug!(cost, candidate = %DisplaySet(&candidate), "checking candidate");
            reporter.candidate(&candidate, cost);
            self.stats.iterations += 1;

            let coex = self.coex.get(&candidate)?;
            if !coex.is_empty() {
                if let Some(failure_id) = self.coex.failure_id() {
                    reporter.counterexample(&coex, failure_id);
                }
                self.hitman.hit(&coex)?;
                self.stats.counterexamples += 1;
                continue;
            }
            if self.coex.failure_id().is_some() {
                // the failing observation contradicts the system without
                // involving any component, no candidate can explain it
                tracing::info!("observation cannot be explained by any component");
                break;
            }

            let first = first_cost.is_none();
            reporter.diagnosis(&candidate, cost, first);
            self.stats.diagnoses += 1;
            if first {
                first_cost = Some(cost);
            }
            if max_diagnoses.is_some_and(|max| self.stats.diagnoses >= max) {
                self.diagnoses.push(candidate);
                break;
            }
            self.hitman.block(&candidate)?;
            let more = !self.opts.check_more || self.coex.block(&candidate)?;
            self.diagnoses.push(candidate);
            if !more {
                tracing::debug!("no observation can be explained anymore");
                break;
            }
        }

        Ok(match first_cost {
            None => Outcome::NoSolution,
            Some(cost) if self.opts.sorted => Outcome::Optimum { cost },
            Some(_) => Outcome::Enumerated,
        })
    }

    fn summary(&self, outcome: Outcome) -> Summary {
        Summary {
            outcome,
            diagnoses: self.diagnoses.clone(),
            stats: self.stats,
        }
    }

    /// The counters so far
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// The CPU time used since the diagnoser was created
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.deadline.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rustsat::{clause, instances::Cnf, ipasir_lit};
    use rustsat_minisat::core::Minisat;

    use super::{Deadline, Diagnoser, Limit, NoReport, Options, Outcome, Report};
    use crate::{instances::Problem, types::Element, Error};

    /// Three buffers in a row from variable 4 to variable 7, with selectors
    /// 1 to 3
    fn buffers(observations: Vec<Vec<rustsat::types::Lit>>) -> Problem {
        let mut system = Cnf::new();
        for (sel, inp) in [(1, 4), (2, 5), (3, 6)] {
            system.add_clause(clause![
                ipasir_lit![-sel],
                ipasir_lit![-inp],
                ipasir_lit![inp + 1]
            ]);
            system.add_clause(clause![
                ipasir_lit![-sel],
                ipasir_lit![inp],
                ipasir_lit![-inp - 1]
            ]);
        }
        Problem::new(system, vec![1, 2, 3], observations).unwrap()
    }

    #[derive(Default)]
    struct Recorder {
        candidates: Vec<Vec<Element>>,
        firsts: usize,
        coexes: Vec<(Vec<Element>, usize)>,
    }

    impl Report for Recorder {
        fn candidate(&mut self, candidate: &[Element], _cost: usize) {
            self.candidates.push(candidate.to_vec());
        }

        fn counterexample(&mut self, coex: &[Element], failure_id: usize) {
            self.coexes.push((coex.to_vec(), failure_id));
        }

        fn diagnosis(&mut self, _diagnosis: &[Element], _cost: usize, first: bool) {
            if first {
                self.firsts += 1;
            }
        }
    }

    #[test]
    fn limit_from_str() {
        assert_eq!("all".parse::<Limit>(), Ok(Limit::All));
        assert_eq!("best".parse::<Limit>(), Ok(Limit::Best));
        assert_eq!("3".parse::<Limit>(), Ok(Limit::Count(3)));
        assert!("some".parse::<Limit>().is_err());
        assert_eq!(Limit::Count(2).to_string(), "2");
    }

    #[test]
    fn best_requires_sorted() {
        let opts = Options {
            limit: Limit::Best,
            ..Options::default()
        };
        let Err(err) = Diagnoser::<Minisat>::new(&buffers(vec![]), opts) else {
            panic!("best limit accepted in unsorted mode");
        };
        assert_eq!(
            err.downcast::<Error>().unwrap(),
            Error::BestRequiresSorted
        );
    }

    #[test]
    fn consistent_observations() {
        let problem = buffers(vec![vec![ipasir_lit![4], ipasir_lit![7]]]);
        let mut diagnoser = Diagnoser::<Minisat>::new(&problem, Options::default()).unwrap();
        let summary = diagnoser.run(&mut NoReport).unwrap();
        assert_eq!(summary.outcome, Outcome::Optimum { cost: 0 });
        assert!(summary.diagnoses.is_empty());
    }

    #[test]
    fn inconsistent_system() {
        let mut system = Cnf::new();
        system.add_clause(clause![ipasir_lit![2]]);
        system.add_clause(clause![ipasir_lit![-1], ipasir_lit![-2]]);
        let problem = Problem::new(system, vec![1], vec![]).unwrap();
        let mut diagnoser = Diagnoser::<Minisat>::new(&problem, Options::default()).unwrap();
        let summary = diagnoser.run(&mut NoReport).unwrap();
        assert_eq!(summary.outcome, Outcome::NoSolution);
    }

    #[test]
    fn enumerate_all() {
        let problem = buffers(vec![
            vec![ipasir_lit![4], ipasir_lit![7]],
            vec![ipasir_lit![4], ipasir_lit![-7]],
        ]);
        let opts = Options {
            limit: Limit::All,
            ..Options::default()
        };
        let mut diagnoser = Diagnoser::<Minisat>::new(&problem, opts).unwrap();
        let mut recorder = Recorder::default();
        let summary = diagnoser.run(&mut recorder).unwrap();
        assert_eq!(summary.outcome, Outcome::Enumerated);
        let mut diagnoses = summary.diagnoses.clone();
        diagnoses.sort();
        assert_eq!(diagnoses, vec![vec![1], vec![2], vec![3]]);
        assert_eq!(summary.stats.diagnoses, 3);
        assert_eq!(summary.stats.counterexamples, 1);
        assert_eq!(summary.stats.iterations, 4);
        assert_eq!(recorder.candidates[0], Vec::<Element>::new());
        // the consistent observation was dropped
        assert_eq!(recorder.coexes, vec![(vec![1, 2, 3], 1)]);
        assert_eq!(recorder.firsts, 1);
    }

    #[test]
    fn enumerate_count() {
        let problem = buffers(vec![vec![ipasir_lit![4], ipasir_lit![-7]]]);
        for (limit, expected) in [(0, 1), (1, 1), (2, 2), (5, 3)] {
            let opts = Options {
                limit: Limit::Count(limit),
                ..Options::default()
            };
            let mut diagnoser = Diagnoser::<Minisat>::new(&problem, opts).unwrap();
            let summary = diagnoser.run(&mut NoReport).unwrap();
            assert_eq!(summary.diagnoses.len(), expected);
        }
    }

    #[test]
    fn bootstrap() {
        let problem = buffers(vec![vec![ipasir_lit![4], ipasir_lit![-7]]]);
        let opts = Options {
            limit: Limit::All,
            bootstrap: true,
            ..Options::default()
        };
        let mut diagnoser = Diagnoser::<Minisat>::new(&problem, opts).unwrap();
        let summary = diagnoser.run(&mut NoReport).unwrap();
        assert_eq!(summary.diagnoses.len(), 3);
        // the bootstrap finds the only counterexample
        assert_eq!(summary.stats.counterexamples, 1);
        assert_eq!(summary.stats.iterations, 3);
    }

    #[test]
    fn unexplainable_observation() {
        // the observation contradicts the system regardless of the component
        let mut system = Cnf::new();
        system.add_clause(clause![ipasir_lit![-2], ipasir_lit![3]]);
        let problem =
            Problem::new(system, vec![1], vec![vec![ipasir_lit![2], ipasir_lit![-3]]]).unwrap();
        let opts = Options {
            limit: Limit::All,
            ..Options::default()
        };
        let mut diagnoser = Diagnoser::<Minisat>::new(&problem, opts).unwrap();
        let summary = diagnoser.run(&mut NoReport).unwrap();
        assert_eq!(summary.outcome, Outcome::NoSolution);
        assert_eq!(summary.stats.iterations, 1);
    }

    #[test]
    fn deadline() {
        assert!(!Deadline::new(None).expired());
        assert!(Deadline::new(Some(Duration::ZERO)).expired());

        let problem = buffers(vec![vec![ipasir_lit![4], ipasir_lit![-7]]]);
        let opts = Options {
            cpu_limit: Some(Duration::ZERO),
            ..Options::default()
        };
        let mut diagnoser = Diagnoser::<Minisat>::new(&problem, opts).unwrap();
        let summary = diagnoser.run(&mut NoReport).unwrap();
        assert_eq!(summary.outcome, Outcome::TimedOut);
        assert_eq!(summary.stats.iterations, 0);
    }
}
