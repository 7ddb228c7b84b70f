//! # Minimal Hitting Sets
//!
//! Computes set-minimal hitting sets as minimal correction sets of the soft
//! constraints with literal-based extraction (LBX) \[1\], optionally using
//! clause D checks \[2\].
//!
//! ## References
//!
//! - \[1\] Carlos Mencía and Alessandro Previti and Joao Marques-Silva: _Literal-Based MCS Extraction_, IJCAI 2015.
//! - \[2\] Joao Marques-Silva and Federico Heras and Mikoláš Janota and Alessandro Previti and Anton Belov: _On Computing Minimal Correction Subsets_, IJCAI 2013.

use rustsat::{
    instances::ManageVars,
    solvers::SolveIncremental,
    types::{Clause, Lit, TernaryVal},
};

use super::{Base, McsAlgorithm, Params};
use crate::Error;

/// State of the set-minimal strategy
#[derive(Debug, Clone, Default)]
pub struct Minimal {
    algorithm: McsAlgorithm,
    clause_d: bool,
    /// Soft literals that are known to be falsified, i.e., elements in the
    /// hitting set
    backbone: Vec<Lit>,
    /// Soft literals that are satisfied
    satisfied: Vec<Lit>,
    /// Soft literals not yet decided
    undecided: Vec<Lit>,
}

impl Minimal {
    pub(super) fn new(params: &Params) -> Self {
        Self {
            algorithm: params.algorithm,
            clause_d: params.clause_d,
            ..Default::default()
        }
    }

    pub(super) fn clear(&mut self) {
        self.backbone.clear();
        self.satisfied.clear();
        self.undecided.clear();
    }

    pub(super) fn get<O>(&mut self, base: &mut Base<O>) -> anyhow::Result<()>
    where
        O: SolveIncremental,
    {
        if self.algorithm != McsAlgorithm::Lbx {
            return Err(Error::UnsupportedAlgorithm(self.algorithm).into());
        }
        self.clear();
        base.solution.clear();

        if !base.solve(&[])? {
            base.cost = None;
            return Ok(());
        }

        // over-approximate the correction set with the model
        for &lit in &base.soft {
            if base.oracle.lit_val(lit)? == TernaryVal::True {
                self.satisfied.push(lit);
            } else {
                self.undecided.push(lit);
            }
        }
        tracing::debug!(
            satisfied = self.satisfied.len(),
            undecided = self.undecided.len(),
            "computing MCS"
        );

        self.lbx(base)?;

        base.solution = self
            .backbone
            .iter()
            .filter_map(|lit| base.map.element_of(lit.var()))
            .collect();
        base.cost = Some(base.solution.len());
        Ok(())
    }

    fn lbx<O>(&mut self, base: &mut Base<O>) -> anyhow::Result<()>
    where
        O: SolveIncremental,
    {
        let mut idx = 0;
        while idx < self.undecided.len() {
            if self.clause_d {
                self.clause_d_check(base, idx)?;
                idx = 0;
                if self.undecided.is_empty() {
                    break;
                }
            }
            let lit = self.undecided[idx];
            self.satisfied.push(lit);
            let assumps: Vec<Lit> = self
                .satisfied
                .iter()
                .chain(&self.backbone)
                .copied()
                .collect();
            if !base.solve(&assumps)? {
                self.satisfied.pop();
                self.backbone.push(!lit);
            }
            idx += 1;
        }
        Ok(())
    }

    /// Checks whether any of the undecided literals from `from` on can be
    /// satisfied together, using a clause that is deactivated afterwards
    fn clause_d_check<O>(&mut self, base: &mut Base<O>, from: usize) -> anyhow::Result<()>
    where
        O: SolveIncremental,
    {
        let clause_d = self.undecided.split_off(from);
        self.undecided.clear();

        let act = base.var_manager.new_var().pos_lit();
        let mut clause: Clause = clause_d.iter().copied().collect();
        clause.add(!act);
        base.oracle.add_clause(clause)?;

        let mut assumps: Vec<Lit> = self
            .satisfied
            .iter()
            .chain(&self.backbone)
            .copied()
            .collect();
        assumps.push(act);
        if base.solve(&assumps)? {
            for lit in clause_d {
                if base.oracle.lit_val(lit)? == TernaryVal::True {
                    self.satisfied.push(lit);
                } else {
                    self.undecided.push(lit);
                }
            }
        } else {
            self.backbone.extend(clause_d.iter().map(|&lit| !lit));
        }

        base.oracle.add_unit(!act)
    }
}
