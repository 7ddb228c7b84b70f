//! # Hitting Set Enumerators
//!
//! A [`Hitman`] maintains a family of sets as hard clauses in a SAT oracle and
//! computes hitting sets of that family. Each element is represented by a
//! variable that is true if the element is part of the hitting set; preferring
//! small hitting sets is expressed by assuming the negation of every element
//! variable (the soft constraints).
//!
//! Two strategies are available:
//!
//! - [`Strategy::Minimal`]: set-minimal hitting sets via LBX
//!   ([`minimal`]),
//! - [`Strategy::Minimum`]: minimum-weight hitting sets via core-guided
//!   OLL-style optimization ([`minimum`]).
//!
//! ```
//! use rustsat_hsd::hitman::{Hitman, Params};
//! use rustsat_minisat::core::Minisat;
//!
//! let mut hitman = Hitman::<Minisat>::minimum(Params::default());
//! hitman.hit(&[1, 2, 3]).unwrap();
//! hitman.hit(&[3, 4]).unwrap();
//! assert_eq!(hitman.enumerate().unwrap(), vec![3]);
//! assert_eq!(hitman.cost(), Some(1));
//! ```

use std::{fmt, str::FromStr};

use rustsat::{
    instances::{BasicVarManager, ManageVars},
    solvers::SolveIncremental,
    types::{Clause, Lit, RsHashSet, Var},
};

use crate::{
    is_sat,
    types::{Cost, Element, ElementMap},
    Error,
};

pub mod minimal;
pub mod minimum;

use minimal::Minimal;
use minimum::Minimum;

/// Algorithms for computing minimal correction sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum McsAlgorithm {
    /// Literal-based extraction
    #[default]
    Lbx,
    /// Unsatisfiable core based disjoint cores
    Ucd,
    /// Unsatisfiable core based binary search
    Ubs,
    /// Linear search with literal backbones and optimized partitioning
    Lopz,
}

impl fmt::Display for McsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            McsAlgorithm::Lbx => write!(f, "lbx"),
            McsAlgorithm::Ucd => write!(f, "ucd"),
            McsAlgorithm::Ubs => write!(f, "ubs"),
            McsAlgorithm::Lopz => write!(f, "lopz"),
        }
    }
}

impl FromStr for McsAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lbx" => Ok(McsAlgorithm::Lbx),
            "ucd" => Ok(McsAlgorithm::Ucd),
            "ubs" => Ok(McsAlgorithm::Ubs),
            "lopz" => Ok(McsAlgorithm::Lopz),
            _ => Err(Error::InvalidValue {
                what: "MCS algorithm",
                value: s.to_string(),
            }),
        }
    }
}

/// Parameters of the hitting set enumerators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    /// The algorithm used by the minimal strategy
    pub algorithm: McsAlgorithm,
    /// Whether the minimal strategy uses clause D checks
    pub clause_d: bool,
    /// How often the minimum strategy tries to shrink an unsat core
    pub trim: usize,
    /// Whether the minimum strategy may derive a hitting set from the
    /// previous one without an oracle call
    pub one_call: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            algorithm: McsAlgorithm::Lbx,
            clause_d: false,
            trim: 0,
            one_call: false,
        }
    }
}

/// The strategy of a [`Hitman`] together with its strategy-specific state
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Set-minimal hitting sets
    Minimal(Minimal),
    /// Minimum-weight hitting sets
    Minimum(Minimum),
}

/// State shared by all strategies
#[derive(Debug)]
pub(crate) struct Base<O> {
    pub oracle: O,
    pub var_manager: BasicVarManager,
    pub map: ElementMap,
    /// Soft assumptions, the negations of element variables
    pub soft: Vec<Lit>,
    /// All element variables that have a soft constraint, in order of appearance
    pub vars: Vec<Var>,
    pub varset: RsHashSet<Var>,
    /// Whether [`Hitman::add_hard`] was ever used
    pub has_hard: bool,
    pub solution: Vec<Element>,
    /// [`None`] once no further hitting set exists
    pub cost: Option<Cost>,
    pub n_oracle_calls: usize,
}

impl<O: Default> Default for Base<O> {
    fn default() -> Self {
        Self {
            oracle: O::default(),
            var_manager: BasicVarManager::default(),
            map: ElementMap::default(),
            soft: vec![],
            vars: vec![],
            varset: RsHashSet::default(),
            has_hard: false,
            solution: vec![],
            cost: Some(0),
            n_oracle_calls: 0,
        }
    }
}

impl<O: SolveIncremental> Base<O> {
    /// Maps an element and adds a soft constraint for it, if it does not have
    /// one yet. The flag is `true` if a soft constraint was added.
    pub fn soft_var(&mut self, el: Element) -> (Var, bool) {
        let (var, _) = self.map.map(el, &mut self.var_manager);
        if !self.varset.insert(var) {
            return (var, false);
        }
        self.soft.push(var.neg_lit());
        self.vars.push(var);
        (var, true)
    }

    /// Calls the oracle under assumptions
    pub fn solve(&mut self, assumps: &[Lit]) -> anyhow::Result<bool> {
        if let Some(max_var) = self.var_manager.max_var() {
            self.oracle.reserve(max_var)?;
        }
        self.n_oracle_calls += 1;
        let res = is_sat(self.oracle.solve_assumps(assumps)?)?;
        tracing::trace!(n_assumps = assumps.len(), sat = res, "hitman oracle call");
        Ok(res)
    }

    /// Extracts the current unsat core and shrinks it by re-solving under the
    /// core at most `trim` times
    pub fn core(&mut self, trim: usize) -> anyhow::Result<Vec<Lit>> {
        let mut core = self.oracle.core()?;
        let mut round = 0;
        while round < trim && core.len() > 1 {
            let assumps: Vec<Lit> = core.iter().map(|&l| !l).collect();
            if self.solve(&assumps)? {
                // cannot happen for a genuine core
                break;
            }
            let trimmed = self.oracle.core()?;
            let stalled = trimmed.len() >= core.len();
            core = trimmed;
            if stalled {
                break;
            }
            round += 1;
        }
        Ok(core)
    }
}

/// A hitting set enumerator over an incremental SAT oracle `O`
#[derive(Debug)]
pub struct Hitman<O> {
    base: Base<O>,
    strategy: Strategy,
}

impl<O> Hitman<O>
where
    O: SolveIncremental + Default,
{
    /// Creates an enumerator of set-minimal hitting sets
    #[must_use]
    pub fn minimal(params: Params) -> Self {
        Self {
            base: Base::default(),
            strategy: Strategy::Minimal(Minimal::new(&params)),
        }
    }

    /// Creates an enumerator of minimum-weight hitting sets
    #[must_use]
    pub fn minimum(params: Params) -> Self {
        Self {
            base: Base::default(),
            strategy: Strategy::Minimum(Minimum::new(&params)),
        }
    }

    /// Gets the strategy of the enumerator
    #[must_use]
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Adds a set that every future hitting set must hit. Empty sets are
    /// ignored.
    ///
    /// # Errors
    ///
    /// If the oracle fails to add the clause.
    pub fn hit(&mut self, set: &[Element]) -> anyhow::Result<()> {
        if set.is_empty() {
            return Ok(());
        }
        let mut clause = Clause::new();
        for &el in set {
            clause.add(self.soft_var(el).pos_lit());
        }
        self.base.oracle.add_clause(clause)?;
        if let Strategy::Minimum(state) = &mut self.strategy {
            state.hit(&self.base, set);
        }
        Ok(())
    }

    /// Forbids every future hitting set from containing all of `set`. An
    /// empty set is ignored.
    ///
    /// # Errors
    ///
    /// If the oracle fails to add the clause.
    pub fn block(&mut self, set: &[Element]) -> anyhow::Result<()> {
        if set.is_empty() {
            return Ok(());
        }
        let clause: Clause = set
            .iter()
            .map(|&el| self.soft_var(el).neg_lit())
            .collect();
        self.base.oracle.add_clause(clause)
    }

    /// Adds an arbitrary hard clause over elements. Element ids are taken
    /// from the absolute value of the literals, the sign gives the polarity.
    /// No soft constraints are added for the referenced elements. An empty
    /// clause is ignored.
    ///
    /// # Errors
    ///
    /// If the oracle fails to add the clause.
    pub fn add_hard(&mut self, clause: &[Element]) -> anyhow::Result<()> {
        if clause.is_empty() {
            return Ok(());
        }
        let clause: Clause = clause
            .iter()
            .map(|&el| {
                let (var, _) = self.base.map.map(el.abs(), &mut self.base.var_manager);
                if el > 0 {
                    var.pos_lit()
                } else {
                    var.neg_lit()
                }
            })
            .collect();
        self.base.oracle.add_clause(clause)?;
        self.base.has_hard = true;
        Ok(())
    }

    /// Adds a soft constraint for an element without any hard clause
    pub fn add_soft(&mut self, el: Element) {
        self.soft_var(el);
    }

    /// Assigns weights to elements. An element keeps the weight it received
    /// on its first weighing, later weights for it are ignored. Elements that
    /// were never weighed have weight 1. The minimal strategy registers the
    /// elements but ignores the weights.
    pub fn weigh<I>(&mut self, weights: I)
    where
        I: IntoIterator<Item = (Element, Cost)>,
    {
        for (el, weight) in weights {
            let var = self.soft_var(el);
            if let Strategy::Minimum(state) = &mut self.strategy {
                state.weigh(el, var, weight);
            }
        }
    }

    /// Computes the next hitting set. An empty result together with
    /// [`Self::cost`] returning [`None`] means no further hitting set exists.
    ///
    /// # Errors
    ///
    /// If the oracle fails, or if an unsupported algorithm is selected.
    pub fn get(&mut self) -> anyhow::Result<Vec<Element>> {
        match &mut self.strategy {
            Strategy::Minimal(state) => state.get(&mut self.base)?,
            Strategy::Minimum(state) => state.get(&mut self.base)?,
        }
        Ok(self.base.solution.clone())
    }

    /// Computes the next hitting set and blocks it, so that the following
    /// call returns a different one. The empty hitting set is not blocked.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get`].
    pub fn enumerate(&mut self) -> anyhow::Result<Vec<Element>> {
        let solution = self.get()?;
        if self.base.cost.is_some() && !self.base.solution.is_empty() {
            let clause: Clause = self
                .base
                .solution
                .iter()
                .filter_map(|&el| self.base.map.var_of(el))
                .map(Var::neg_lit)
                .collect();
            self.base.oracle.add_clause(clause)?;
        }
        Ok(solution)
    }

    /// The cost of the last hitting set, or [`None`] if no further hitting
    /// set exists
    #[must_use]
    pub fn cost(&self) -> Option<Cost> {
        self.base.cost
    }

    /// Resets the enumerator to its initial state with a fresh oracle,
    /// keeping its parameters
    pub fn clear(&mut self) {
        self.base = Base::default();
        match &mut self.strategy {
            Strategy::Minimal(state) => state.clear(),
            Strategy::Minimum(state) => state.clear(),
        }
    }

    /// The number of elements with a soft constraint
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.base.vars.len()
    }

    /// The number of oracle calls made so far
    #[must_use]
    pub fn n_oracle_calls(&self) -> usize {
        self.base.n_oracle_calls
    }

    fn soft_var(&mut self, el: Element) -> Var {
        let (var, added) = self.base.soft_var(el);
        if added {
            if let Strategy::Minimum(state) = &mut self.strategy {
                state.register(var);
            }
        }
        var
    }
}
