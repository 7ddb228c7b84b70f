//! # Diagnosis Problems
//!
//! A [`Problem`] consists of a system description in CNF, the selectors of
//! the system's components together with their weights, and a list of
//! observations. A component is healthy if its selector is true; a healthy
//! component behaves as the system description prescribes.

use std::path::Path;

use rustsat::{
    instances::{BasicVarManager, Cnf, ManageVars},
    types::{Clause, Lit, RsHashMap, Var},
};

use crate::{
    types::{selector_element, selector_var, Cost, Element},
    Error,
};

pub mod fio;

use fio::mwcnf::{Mwcnf, Weight};

/// A model-based diagnosis problem
#[derive(Debug, Clone, Default)]
pub struct Problem {
    /// The hard system description
    pub system: Cnf,
    /// The component selectors in load order
    pub selectors: Vec<Element>,
    /// The weight of each selector
    pub weights: Vec<Cost>,
    /// The observations, each a conjunction of literals
    pub observations: Vec<Vec<Lit>>,
    var_manager: BasicVarManager,
}

impl Problem {
    /// Creates a problem from its parts. All components have weight 1.
    ///
    /// # Errors
    ///
    /// If a selector is not positive, returns [`Error::InvalidSelector`].
    pub fn new(
        system: Cnf,
        selectors: Vec<Element>,
        observations: Vec<Vec<Lit>>,
    ) -> Result<Self, Error> {
        let mut max_var = None;
        for &el in &selectors {
            max_var = max_opt(max_var, Some(selector_var(el)?));
        }
        for clause in system.iter() {
            max_var = max_opt(max_var, max_lit_var(clause.iter()));
        }
        for obs in &observations {
            max_var = max_opt(max_var, max_lit_var(obs.iter()));
        }
        let weights = vec![1; selectors.len()];
        Ok(Self {
            system,
            selectors,
            weights,
            observations,
            var_manager: var_manager_above(max_var),
        })
    }

    /// Creates a problem from a parsed input file. Hard clauses become part of
    /// the system. A soft clause consisting of a single positive literal
    /// makes that literal's variable a selector; every other soft clause is
    /// relaxed with a fresh selector `s` by adding the literal `-s`.
    #[must_use]
    pub fn from_mwcnf(inst: Mwcnf) -> Self {
        let mut prob = Self {
            var_manager: var_manager_above(inst.max_var),
            observations: inst.observations,
            ..Self::default()
        };
        for (weight, mut clause) in inst.clauses {
            let weight = match weight {
                Weight::Hard => {
                    prob.system.add_clause(clause);
                    continue;
                }
                Weight::Soft(weight) => weight,
            };
            let sel = match single_pos_lit(&clause) {
                Some(lit) => lit.var(),
                None => {
                    let sel = prob.var_manager.new_var();
                    clause.add(sel.neg_lit());
                    prob.system.add_clause(clause);
                    sel
                }
            };
            prob.selectors.push(selector_element(sel));
            prob.weights.push(weight);
        }
        tracing::info!(
            system = prob.system.len(),
            components = prob.selectors.len(),
            observations = prob.observations.len(),
            "loaded problem"
        );
        prob
    }

    /// Loads a problem from an input file
    ///
    /// # Errors
    ///
    /// IO or parsing errors.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, fio::mwcnf::Error> {
        Ok(Self::from_mwcnf(Mwcnf::from_path(path)?))
    }

    /// Sets the weights of the components, in the order of
    /// [`Problem::selectors`]
    #[must_use]
    pub fn with_weights(mut self, weights: Vec<Cost>) -> Self {
        debug_assert_eq!(weights.len(), self.selectors.len());
        self.weights = weights;
        self
    }

    /// The largest variable used by the problem
    #[must_use]
    pub fn max_var(&self) -> Option<Var> {
        self.var_manager.max_var()
    }

    /// Whether any component has a weight other than 1
    #[must_use]
    pub fn is_weighted(&self) -> bool {
        self.weights.iter().any(|&w| w != 1)
    }

    /// Iterates over the components and their weights
    pub fn weighted_selectors(&self) -> impl Iterator<Item = (Element, Cost)> + '_ {
        self.selectors
            .iter()
            .copied()
            .zip(self.weights.iter().copied())
    }

    /// Gets the 1-based position of a component in load order
    #[must_use]
    pub fn component_index(&self, el: Element) -> Option<usize> {
        self.selectors.iter().position(|&sel| sel == el).map(|i| i + 1)
    }

    /// Maps every component to its 1-based position in load order. For
    /// repeated selectors, the first position is kept.
    #[must_use]
    pub fn component_indices(&self) -> RsHashMap<Element, usize> {
        let mut map = RsHashMap::default();
        for (idx, &sel) in self.selectors.iter().enumerate() {
            map.entry(sel).or_insert(idx + 1);
        }
        map
    }
}

fn single_pos_lit(clause: &Clause) -> Option<Lit> {
    match clause.iter().collect::<Vec<_>>().as_slice() {
        [lit] if lit.is_pos() => Some(**lit),
        _ => None,
    }
}

fn max_opt(a: Option<Var>, b: Option<Var>) -> Option<Var> {
    match (a, b) {
        (Some(a), Some(b)) => Some(std::cmp::max(a, b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn max_lit_var<'a, I: Iterator<Item = &'a Lit>>(lits: I) -> Option<Var> {
    lits.map(|lit| lit.var()).max()
}

fn var_manager_above(max_var: Option<Var>) -> BasicVarManager {
    match max_var {
        Some(max_var) => BasicVarManager::from_next_free(Var::new(max_var.idx32() + 1)),
        None => BasicVarManager::default(),
    }
}
