//! # Minimum-Weight Hitting Sets
//!
//! Computes minimum-weight hitting sets by treating the soft constraints as a
//! weighted partial MaxSAT instance solved with the core-guided OLL algorithm
//! \[1\]. Cores are relaxed with incremental totalizers and weights are split
//! among core members, so that a literal with weight left after a core keeps
//! being assumed.
//!
//! ## References
//!
//! - \[1\] Antonio Morgado and Carmine Dodaro and Joao Marques-Silva: _Core-Guided MaxSAT with Soft Cardinality Constraints_, CP 2014.

use rustsat::{
    instances::{Cnf, ManageVars},
    solvers::SolveIncremental,
    types::{Lit, RsHashMap, RsHashSet, TernaryVal, Var},
};

use super::{Base, Params};
use crate::{
    encodings::totalizer::{self, NodeId},
    types::{Cost, Element},
};

/// Where a totalizer output literal assumed by the enumerator lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundInfo {
    /// Index into the sums
    sum: usize,
    /// Index into the outputs of the sum
    output: usize,
}

/// A split unsat core
#[derive(Debug, Default)]
struct Core {
    /// Element variables whose soft constraint is in the core
    soft: Vec<Var>,
    /// Totalizer outputs whose bound is in the core
    sums: Vec<Var>,
    /// Minimum weight of the core members
    weight: Cost,
}

impl Core {
    fn is_empty(&self) -> bool {
        self.soft.is_empty() && self.sums.is_empty()
    }
}

/// State of the minimum-weight strategy
#[derive(Debug, Clone)]
pub struct Minimum {
    trim: usize,
    one_call: bool,
    /// Whether any element was weighed with a weight other than 1
    weighted: bool,
    /// Element variables whose soft constraint is still assumed
    soft_vars: RsHashSet<Var>,
    soft_weights: RsHashMap<Var, Cost>,
    weighed: RsHashSet<Element>,
    /// The last set hit after a hitting set was found
    pending: Vec<Element>,
    /// Result of the most recent attempt to find a hitting set
    last_sat: bool,
    db: totalizer::Db,
    sums: Vec<NodeId>,
    /// Assumed negated totalizer outputs
    sum_assumps: Vec<Lit>,
    sum_weights: RsHashMap<Var, Cost>,
    bounds: RsHashMap<Var, BoundInfo>,
}

impl Minimum {
    pub(super) fn new(params: &Params) -> Self {
        Self {
            trim: params.trim,
            one_call: params.one_call,
            weighted: false,
            soft_vars: RsHashSet::default(),
            soft_weights: RsHashMap::default(),
            weighed: RsHashSet::default(),
            pending: vec![],
            last_sat: true,
            db: totalizer::Db::default(),
            sums: vec![],
            sum_assumps: vec![],
            sum_weights: RsHashMap::default(),
            bounds: RsHashMap::default(),
        }
    }

    pub(super) fn clear(&mut self) {
        *self = Self::new(&Params {
            trim: self.trim,
            one_call: self.one_call,
            ..Params::default()
        });
    }

    /// Registers a new soft constraint with the default weight
    pub(super) fn register(&mut self, var: Var) {
        self.soft_vars.insert(var);
        self.soft_weights.insert(var, 1);
    }

    pub(super) fn weigh(&mut self, el: Element, var: Var, weight: Cost) {
        if !self.weighed.insert(el) {
            return;
        }
        self.soft_weights.insert(var, weight);
        if weight != 1 {
            self.weighted = true;
        }
    }

    pub(super) fn hit<O>(&mut self, base: &Base<O>, set: &[Element]) {
        if !base.solution.is_empty() {
            self.pending = set.to_vec();
        }
    }

    pub(super) fn get<O>(&mut self, base: &mut Base<O>) -> anyhow::Result<()>
    where
        O: SolveIncremental,
    {
        if base.vars.is_empty() {
            return Ok(());
        }
        while !self.compute(base)? {
            let core = self.split_core(base)?;
            if core.is_empty() {
                tracing::debug!("hard part unsatisfiable, no hitting set left");
                base.cost = None;
                base.solution.clear();
                return Ok(());
            }
            tracing::debug!(
                soft = core.soft.len(),
                sums = core.sums.len(),
                weight = core.weight,
                "processing core"
            );
            base.cost = base.cost.map(|cost| cost + core.weight);
            self.process_core(base, &core)?;
        }
        Ok(())
    }

    /// Tries to find a hitting set respecting the current bounds
    fn compute<O>(&mut self, base: &mut Base<O>) -> anyhow::Result<bool>
    where
        O: SolveIncremental,
    {
        if self.one_call
            && !self.weighted
            && !base.has_hard
            && !self.last_sat
            && !base.solution.is_empty()
            && self.extend_solution(base)
        {
            self.last_sat = true;
            return Ok(true);
        }

        let assumps: Vec<Lit> = base
            .soft
            .iter()
            .chain(&self.sum_assumps)
            .copied()
            .collect();
        self.last_sat = base.solve(&assumps)?;
        if self.last_sat {
            base.solution.clear();
            for &var in &base.vars {
                if base.oracle.var_val(var)? == TernaryVal::True {
                    if let Some(el) = base.map.element_of(var) {
                        base.solution.push(el);
                    }
                }
            }
        }
        Ok(self.last_sat)
    }

    /// Adds the first element of the pending set that is not yet in the
    /// solution. Returns `false` if there is no such element.
    fn extend_solution<O>(&mut self, base: &mut Base<O>) -> bool {
        let known: RsHashSet<Element> = base.solution.iter().copied().collect();
        let next = self.pending.iter().copied().find(|el| !known.contains(el));
        self.pending.clear();
        match next {
            Some(el) => {
                base.solution.push(el);
                true
            }
            None => false,
        }
    }

    fn split_core<O>(&self, base: &mut Base<O>) -> anyhow::Result<Core>
    where
        O: SolveIncremental,
    {
        let mut core = Core {
            weight: Cost::MAX,
            ..Core::default()
        };
        for lit in base.core(self.trim)? {
            let var = lit.var();
            let weight = if self.soft_vars.contains(&var) {
                core.soft.push(var);
                self.soft_weights.get(&var)
            } else {
                core.sums.push(var);
                self.sum_weights.get(&var)
            };
            core.weight = core.weight.min(weight.copied().unwrap_or(1));
        }
        Ok(core)
    }

    fn process_core<O>(&mut self, base: &mut Base<O>, core: &Core) -> anyhow::Result<()>
    where
        O: SolveIncremental,
    {
        let mut consumed = RsHashSet::default();
        let Some(inputs) = self.relax_harden_split(base, core, &mut consumed)? else {
            self.filter_soft(base, &consumed);
            return Ok(());
        };

        if inputs.len() > 1 {
            let mut cnf = Cnf::new();
            let root = self.db.build(&inputs, 1, &mut cnf, &mut base.var_manager)?;
            base.oracle.add_cnf(cnf)?;
            if let Some(root) = root {
                let sum = self.sums.len();
                self.sums.push(root);
                let olit = self.db.outputs(root)[1];
                self.bounds.insert(olit.var(), BoundInfo { sum, output: 1 });
                self.sum_assumps.push(!olit);
                self.sum_weights.insert(olit.var(), core.weight);
            }
        }

        self.filter_soft(base, &consumed);
        Ok(())
    }

    /// Relaxes the soft part of the core, advances the bounds of the sums in
    /// the core and returns the inputs for a new sum. Returns [`None`] if the
    /// core was a single soft literal that got hardened instead.
    fn relax_harden_split<O>(
        &mut self,
        base: &mut Base<O>,
        core: &Core,
        consumed: &mut RsHashSet<Var>,
    ) -> anyhow::Result<Option<Vec<Lit>>>
    where
        O: SolveIncremental,
    {
        let mut inputs = Vec::with_capacity(core.soft.len() + core.sums.len());

        for &var in &core.soft {
            let weight = self.soft_weights.entry(var).or_insert(1);
            *weight -= core.weight;
            if *weight == 0 {
                consumed.insert(var);
            }

            if core.soft.len() == 1 && core.sums.is_empty() {
                base.oracle.add_unit(var.pos_lit())?;
                return Ok(None);
            }

            let relax = base.var_manager.new_var().pos_lit();
            base.oracle.add_binary(var.neg_lit(), relax)?;
            inputs.push(relax);
        }

        let mut unassume = RsHashSet::default();
        for &var in &core.sums {
            let Some(&BoundInfo { sum, output }) = self.bounds.get(&var) else {
                debug_assert!(false, "core literal {var} is not an assumption");
                continue;
            };
            let bound = output + 1;
            inputs.push(var.pos_lit());

            let weight = self.sum_weights.entry(var).or_insert(0);
            if *weight == core.weight {
                unassume.insert(var);
            } else {
                *weight -= core.weight;
            }

            let root = self.sums[sum];
            let mut cnf = Cnf::new();
            self.db
                .extend(root, bound, &mut cnf, &mut base.var_manager)?;
            base.oracle.add_cnf(cnf)?;

            if let Some(&next) = self.db.outputs(root).get(bound) {
                let next = next.var();
                if unassume.remove(&next) {
                    self.sum_weights.insert(next, 0);
                }
                if self.bounds.contains_key(&next) {
                    *self.sum_weights.entry(next).or_insert(0) += core.weight;
                } else {
                    self.sum_assumps.push(next.neg_lit());
                    self.sum_weights.insert(next, core.weight);
                    self.bounds.insert(next, BoundInfo { sum, output: bound });
                }
            }
        }

        if !unassume.is_empty() {
            self.sum_assumps.retain(|lit| !unassume.contains(&lit.var()));
            for var in &unassume {
                self.bounds.remove(var);
                self.sum_weights.remove(var);
            }
        }

        Ok(Some(inputs))
    }

    /// Stops assuming the soft constraints whose weight is used up
    fn filter_soft<O>(&mut self, base: &mut Base<O>, consumed: &RsHashSet<Var>) {
        if consumed.is_empty() {
            return;
        }
        base.soft.retain(|lit| !consumed.contains(&lit.var()));
        for var in consumed {
            self.soft_vars.remove(var);
        }
    }
}
