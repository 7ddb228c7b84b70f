//! # Counterexample Finder
//!
//! Checks candidate diagnoses against the observations of a problem. The
//! system description is loaded into a SAT oracle once; every component is
//! represented by a selector variable whose positive literal means the
//! component is healthy. A candidate is checked by assuming all components
//! outside of it healthy, jointly with one observation at a time.
//!
//! If an observation is inconsistent with a candidate, the unsat core yields a
//! counterexample: a set of components of which at least one has to be faulty
//! in every diagnosis. Counterexamples can optionally be trimmed and reduced
//! to subset-minimality (see [`Reduction`]).

use std::{fmt, str::FromStr};

use rustsat::{
    instances::Cnf,
    solvers::SolveIncremental,
    types::{Clause, Lit, RsHashMap, RsHashSet, Var},
};

use crate::{
    instances::Problem,
    is_sat,
    types::{selector_element, selector_var, Element},
    DisplaySet, Error,
};

/// How counterexamples are reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// Take the components of the unsat core as they are
    #[default]
    None,
    /// Try removing components one by one
    Lin,
    /// Remove ranges of components, QuickXplain-style
    Qxp,
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::None => write!(f, "none"),
            Reduction::Lin => write!(f, "lin"),
            Reduction::Qxp => write!(f, "qxp"),
        }
    }
}

impl FromStr for Reduction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Reduction::None),
            "lin" => Ok(Reduction::Lin),
            "qxp" => Ok(Reduction::Qxp),
            _ => Err(Error::InvalidValue {
                what: "counterexample reduction",
                value: s.to_string(),
            }),
        }
    }
}

/// Options of the counterexample finder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    /// The reduction applied to counterexamples
    pub reduction: Reduction,
    /// How often to try shrinking an unsat core before reducing it
    pub trim: usize,
    /// Reduce against all observations instead of only the failing one
    pub exhaustive: bool,
}

/// Finds counterexamples to candidate diagnoses with an incremental SAT
/// oracle `O`
#[derive(Debug)]
pub struct CoexFinder<O> {
    oracle: O,
    /// Components in ascending order
    selectors: Vec<Element>,
    /// The healthy literals of [`Self::selectors`]
    healthy: Vec<Lit>,
    components: RsHashSet<Var>,
    observations: Vec<Vec<Lit>>,
    failure_id: Option<usize>,
    /// Results of reduction checks, keyed by the components kept
    cache: RsHashMap<Vec<bool>, bool>,
    opts: Options,
    n_oracle_calls: usize,
}

impl<O> CoexFinder<O>
where
    O: SolveIncremental + Default,
{
    /// Creates a counterexample finder from a system description, its
    /// components and the observations
    ///
    /// # Errors
    ///
    /// If a selector is not a positive id, or if the oracle fails to load the
    /// system.
    pub fn new(
        system: Cnf,
        selectors: &[Element],
        observations: Vec<Vec<Lit>>,
        opts: Options,
    ) -> anyhow::Result<Self> {
        let mut oracle = O::default();
        oracle.add_cnf(system)?;

        let mut selectors = selectors.to_vec();
        selectors.sort_unstable();
        selectors.dedup();
        let healthy = selectors
            .iter()
            .map(|&el| selector_var(el).map(Var::pos_lit))
            .collect::<Result<Vec<_>, _>>()?;
        let components = healthy.iter().map(|lit| lit.var()).collect();

        Ok(Self {
            oracle,
            selectors,
            healthy,
            components,
            observations,
            failure_id: None,
            cache: RsHashMap::default(),
            opts,
            n_oracle_calls: 0,
        })
    }

    /// Creates a counterexample finder for a problem
    ///
    /// # Errors
    ///
    /// Same as [`Self::new`].
    pub fn from_problem(problem: &Problem, opts: Options) -> anyhow::Result<Self> {
        let mut finder = Self::new(
            problem.system.clone(),
            &problem.selectors,
            problem.observations.clone(),
            opts,
        )?;
        if let Some(max_var) = problem.max_var() {
            finder.oracle.reserve(max_var)?;
        }
        Ok(finder)
    }

    /// Checks the system with all components healthy. Without observations,
    /// this checks that the system description is consistent. With
    /// observations, every observation that is consistent with the healthy
    /// system is dropped, since it cannot contribute to any diagnosis. Returns
    /// `true` if no observation is inconsistent.
    ///
    /// # Errors
    ///
    /// If the oracle fails.
    pub fn check(&mut self, with_observations: bool) -> anyhow::Result<bool> {
        let healthy = self.healthy.clone();
        if !with_observations {
            return self.solve(&healthy);
        }
        let mut failing = Vec::with_capacity(self.observations.len());
        for idx in 0..self.observations.len() {
            if !self.solve_with(&healthy, idx)? {
                failing.push(idx);
            }
        }
        if failing.len() < self.observations.len() {
            tracing::info!(
                failures = failing.len(),
                dropped = self.observations.len() - failing.len(),
                "filtered observations"
            );
            let mut observations = std::mem::take(&mut self.observations);
            self.observations = failing
                .into_iter()
                .map(|idx| std::mem::take(&mut observations[idx]))
                .collect();
        }
        Ok(self.observations.is_empty())
    }

    /// Checks a candidate diagnosis against the observations in order. At the
    /// first inconsistent observation, returns a counterexample in ascending
    /// order. An empty result means the candidate is consistent with all
    /// observations.
    ///
    /// # Errors
    ///
    /// If the oracle fails.
    pub fn get(&mut self, candidate: &[Element]) -> anyhow::Result<Vec<Element>> {
        let mut candidate = candidate.to_vec();
        candidate.sort_unstable();

        // components not in the candidate are assumed healthy
        let mut assumps = Vec::with_capacity(self.selectors.len());
        let mut cands = candidate.iter().peekable();
        for (&el, &lit) in self.selectors.iter().zip(&self.healthy) {
            while cands.next_if(|&&c| c < el).is_some() {}
            if cands.next_if_eq(&&el).is_none() {
                assumps.push(lit);
            }
        }

        self.failure_id = None;
        for idx in 0..self.observations.len() {
            if self.solve_with(&assumps, idx)? {
                continue;
            }
            self.failure_id = Some(idx + 1);
            let core = self.oracle.core()?;
            let core = if core.len() > 1 && self.opts.trim > 0 {
                self.trim_core(core)?
            } else {
                core
            };
            let mut coex = match self.opts.reduction {
                Reduction::None => core
                    .iter()
                    .map(|lit| lit.var())
                    .filter(|var| self.components.contains(var))
                    .map(selector_element)
                    .collect(),
                Reduction::Lin | Reduction::Qxp => self.reduce(&core)?,
            };
            coex.sort_unstable();
            tracing::debug!(
                observation = idx + 1,
                core = core.len(),
                "counterexample: {}",
                DisplaySet(&coex)
            );
            return Ok(coex);
        }
        Ok(vec![])
    }

    /// Permanently requires that not all components of a diagnosis are faulty
    /// at once, then checks whether every observation can still be explained.
    /// Returns `false` if some observation cannot, in which case no further
    /// diagnosis exists.
    ///
    /// # Errors
    ///
    /// If the oracle fails.
    pub fn block(&mut self, diagnosis: &[Element]) -> anyhow::Result<bool> {
        let clause = diagnosis
            .iter()
            .map(|&el| selector_var(el).map(Var::pos_lit))
            .collect::<Result<Clause, _>>()?;
        self.oracle.add_clause(clause)?;
        for idx in 0..self.observations.len() {
            if !self.solve_with(&[], idx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The 1-based index of the observation that failed in the last call to
    /// [`Self::get`], if any failed
    #[must_use]
    pub fn failure_id(&self) -> Option<usize> {
        self.failure_id
    }

    /// The observations still considered
    #[must_use]
    pub fn observations(&self) -> &[Vec<Lit>] {
        &self.observations
    }

    /// The components in ascending order
    #[must_use]
    pub fn selectors(&self) -> &[Element] {
        &self.selectors
    }

    /// The number of oracle calls made so far
    #[must_use]
    pub fn n_oracle_calls(&self) -> usize {
        self.n_oracle_calls
    }

    fn solve(&mut self, assumps: &[Lit]) -> anyhow::Result<bool> {
        self.n_oracle_calls += 1;
        let res = is_sat(self.oracle.solve_assumps(assumps)?)?;
        tracing::trace!(n_assumps = assumps.len(), sat = res, "coex oracle call");
        Ok(res)
    }

    /// Solves under the given assumptions together with an observation
    fn solve_with(&mut self, assumps: &[Lit], obs_idx: usize) -> anyhow::Result<bool> {
        let mut all = Vec::with_capacity(assumps.len() + self.observations[obs_idx].len());
        all.extend_from_slice(assumps);
        all.extend_from_slice(&self.observations[obs_idx]);
        self.solve(&all)
    }

    /// Shrinks a core by re-solving under it, at most [`Options::trim`] times
    fn trim_core(&mut self, mut core: Vec<Lit>) -> anyhow::Result<Vec<Lit>> {
        for _ in 0..self.opts.trim {
            if core.len() <= 1 {
                break;
            }
            let assumps: Vec<Lit> = core.iter().map(|&l| !l).collect();
            if self.solve(&assumps)? {
                break;
            }
            let trimmed = self.oracle.core()?;
            let stalled = trimmed.len() >= core.len();
            core = trimmed;
            if stalled {
                break;
            }
        }
        Ok(core)
    }

    /// Reduces the components of a core to a subset-minimal counterexample
    fn reduce(&mut self, core: &[Lit]) -> anyhow::Result<Vec<Element>> {
        let (mut comps, obs): (Vec<Lit>, Vec<Lit>) = core
            .iter()
            .map(|&lit| !lit)
            .partition(|lit| self.components.contains(&lit.var()));
        let obs = if self.opts.exhaustive {
            None
        } else {
            Some(obs.as_slice())
        };
        let before = comps.len();
        match self.opts.reduction {
            Reduction::Qxp => self.reduce_qxp(&mut comps, obs)?,
            _ => self.reduce_lin(&mut comps, obs)?,
        }
        tracing::debug!(before, after = comps.len(), "reduced counterexample");
        Ok(comps
            .into_iter()
            .map(|lit| selector_element(lit.var()))
            .collect())
    }

    fn reduce_lin(&mut self, comps: &mut Vec<Lit>, obs: Option<&[Lit]>) -> anyhow::Result<()> {
        let mut idx = 0;
        while idx < comps.len() {
            let lit = comps.swap_remove(idx);
            if self.is_consistent(comps, obs)? {
                // necessary, put it back
                comps.push(lit);
                let last = comps.len() - 1;
                comps.swap(idx, last);
                idx += 1;
            }
        }
        Ok(())
    }

    fn reduce_qxp(&mut self, comps: &mut Vec<Lit>, obs: Option<&[Lit]>) -> anyhow::Result<()> {
        self.cache.clear();
        let n = comps.len();
        let mut keep = vec![true; n];
        // LIFO, the first half is processed first
        let mut ranges = vec![(n / 2, n - n / 2), (0, n / 2)];
        while let Some((start, len)) = ranges.pop() {
            if len == 0 {
                continue;
            }
            if self.drop_range(comps, obs, &mut keep, start, len)? && len > 1 {
                ranges.push((start + len / 2, len - len / 2));
                ranges.push((start, len / 2));
            }
        }
        let mut keep = keep.into_iter();
        comps.retain(|_| keep.next().unwrap_or(true));
        Ok(())
    }

    /// Tentatively drops a range of components. If the rest becomes
    /// consistent, the range is restored and `true` is returned.
    fn drop_range(
        &mut self,
        comps: &[Lit],
        obs: Option<&[Lit]>,
        keep: &mut [bool],
        start: usize,
        len: usize,
    ) -> anyhow::Result<bool> {
        keep[start..start + len].fill(false);
        let restore = if let Some(&consistent) = self.cache.get(&*keep) {
            consistent
        } else {
            let kept: Vec<Lit> = comps
                .iter()
                .zip(keep.iter())
                .filter_map(|(&lit, &k)| k.then_some(lit))
                .collect();
            let consistent = self.is_consistent(&kept, obs)?;
            self.cache.insert(keep.to_vec(), consistent);
            consistent
        };
        if restore {
            keep[start..start + len].fill(true);
        }
        Ok(restore)
    }

    /// Checks whether the given healthy components are consistent with the
    /// observation literals, or with every observation if none are given
    fn is_consistent(&mut self, comps: &[Lit], obs: Option<&[Lit]>) -> anyhow::Result<bool> {
        if let Some(obs) = obs {
            let mut assumps = comps.to_vec();
            assumps.extend_from_slice(obs);
            return self.solve(&assumps);
        }
        for idx in 0..self.observations.len() {
            if !self.solve_with(comps, idx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
