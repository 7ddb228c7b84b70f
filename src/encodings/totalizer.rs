//! # Incremental Totalizer Forest
//!
//! Implementation of the binary adder tree totalizer encoding \[1\] with
//! incremental extension of the output bound as described in \[2\]. All trees
//! live in one arena ([`Db`]) and refer to their children via [`NodeId`]s.
//! Trees are only ever extended, never re-encoded, since clauses that were
//! already handed to an oracle cannot be retracted.
//!
//! Output `i` (0-indexed) of a node is implied by at least `i + 1` of the
//! node's inputs being true. Only this direction of the encoding is
//! generated, which is all that is needed for upper bounding.
//!
//! ## References
//!
//! - \[1\] Olivier Bailleux and Yacine Boufkhad: _Efficient CNF Encoding of Boolean Cardinality Constraints_, CP 2003.
//! - \[2\] Ruben Martins and Saurabh Joshi and Vasco Manquinho and Ines Lynce: _Incremental Cardinality Constraints for MaxSAT_, CP 2014.

use std::{cmp, collections::VecDeque, fmt};

use rustsat::{
    encodings::{atomics, CollectClauses},
    instances::ManageVars,
    types::Lit,
    OutOfMemory,
};

/// A handle to a node in a [`Db`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Node {
    /// The output literals encoded so far
    outputs: Vec<Lit>,
    /// The number of input literals below this node
    n_inputs: usize,
    /// The children, if this is an internal node. Children always have a
    /// lower ID than their parent.
    children: Option<(NodeId, NodeId)>,
}

/// An arena of incremental totalizer trees
#[derive(Debug, Default, Clone)]
pub struct Db {
    nodes: Vec<Node>,
}

impl Db {
    /// Builds a totalizer over `inputs` that counts up to `k + 1` true inputs.
    /// Leaves are merged pairwise in queue order, oldest trees first. Returns
    /// [`None`] if there are no inputs.
    ///
    /// # Errors
    ///
    /// If the clause collector runs out of memory, returns [`OutOfMemory`].
    pub fn build<Col>(
        &mut self,
        inputs: &[Lit],
        k: usize,
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<Option<NodeId>, OutOfMemory>
    where
        Col: CollectClauses,
    {
        let mut queue: VecDeque<NodeId> = inputs.iter().map(|&lit| self.leaf(lit)).collect();
        loop {
            let Some(left) = queue.pop_front() else {
                return Ok(None);
            };
            let Some(right) = queue.pop_front() else {
                return Ok(Some(left));
            };
            let id = self.internal(left, right, k, collector, var_manager)?;
            queue.push_back(id);
        }
    }

    /// Extends a tree so that it counts up to `k + 1` true inputs. Only the
    /// clauses for newly created outputs are generated. If the tree already
    /// has enough outputs, this is a no-op.
    ///
    /// # Errors
    ///
    /// If the clause collector runs out of memory, returns [`OutOfMemory`].
    pub fn extend<Col>(
        &mut self,
        id: NodeId,
        k: usize,
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<(), OutOfMemory>
    where
        Col: CollectClauses,
    {
        let node = &self.nodes[id.0];
        let target = cmp::min(k + 1, node.n_inputs);
        if target <= node.outputs.len() {
            return Ok(());
        }
        let Some((left, right)) = node.children else {
            // leaves always have their single output
            return Ok(());
        };
        self.extend(left, k, collector, var_manager)?;
        self.extend(right, k, collector, var_manager)?;
        let outputs = &mut self.nodes[id.0].outputs;
        let last = outputs.len();
        outputs.extend((last..target).map(|_| var_manager.new_var().pos_lit()));
        self.encode(id, last, collector)
    }

    /// Merges two trees into a new tree counting up to `k + 1` true inputs.
    /// Both trees are extended to `k` first.
    ///
    /// # Errors
    ///
    /// If the clause collector runs out of memory, returns [`OutOfMemory`].
    pub fn merge<Col>(
        &mut self,
        left: NodeId,
        right: NodeId,
        k: usize,
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<NodeId, OutOfMemory>
    where
        Col: CollectClauses,
    {
        self.extend(left, k, collector, var_manager)?;
        self.extend(right, k, collector, var_manager)?;
        self.internal(left, right, k, collector, var_manager)
    }

    /// Absorbs additional inputs into an existing tree by building a tree
    /// over the new inputs and merging it with the existing one.
    ///
    /// # Errors
    ///
    /// If the clause collector runs out of memory, returns [`OutOfMemory`].
    pub fn merge_inputs<Col>(
        &mut self,
        id: NodeId,
        inputs: &[Lit],
        k: usize,
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<NodeId, OutOfMemory>
    where
        Col: CollectClauses,
    {
        match self.build(inputs, k, collector, var_manager)? {
            Some(other) => self.merge(id, other, k, collector, var_manager),
            None => {
                self.extend(id, k, collector, var_manager)?;
                Ok(id)
            }
        }
    }

    /// Gets the output literals of a tree encoded so far
    #[must_use]
    pub fn outputs(&self, id: NodeId) -> &[Lit] {
        &self.nodes[id.0].outputs
    }

    /// Gets the number of inputs of a tree
    #[must_use]
    pub fn n_inputs(&self, id: NodeId) -> usize {
        self.nodes[id.0].n_inputs
    }

    /// The number of nodes in the arena
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Checks whether the arena is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drops all trees
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    fn leaf(&mut self, lit: Lit) -> NodeId {
        self.nodes.push(Node {
            outputs: vec![lit],
            n_inputs: 1,
            children: None,
        });
        NodeId(self.nodes.len() - 1)
    }

    fn internal<Col>(
        &mut self,
        left: NodeId,
        right: NodeId,
        k: usize,
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<NodeId, OutOfMemory>
    where
        Col: CollectClauses,
    {
        let n_inputs = self.nodes[left.0].n_inputs + self.nodes[right.0].n_inputs;
        let n_outputs = cmp::min(k + 1, n_inputs);
        self.nodes.push(Node {
            outputs: (0..n_outputs)
                .map(|_| var_manager.new_var().pos_lit())
                .collect(),
            n_inputs,
            children: Some((left, right)),
        });
        let id = NodeId(self.nodes.len() - 1);
        self.encode(id, 0, collector)?;
        Ok(id)
    }

    /// Generates the clauses defining the outputs of a node from index `last`
    /// on, given the current outputs of its children
    fn encode<Col>(&self, id: NodeId, last: usize, collector: &mut Col) -> Result<(), OutOfMemory>
    where
        Col: CollectClauses,
    {
        let node = &self.nodes[id.0];
        let Some((left, right)) = node.children else {
            return Ok(());
        };
        let out = &node.outputs;
        let lout = &self.nodes[left.0].outputs;
        let rout = &self.nodes[right.0].outputs;
        let k = out.len();

        // only one child contributes
        for j in last..cmp::min(k, rout.len()) {
            collector.add_clause(atomics::lit_impl_lit(rout[j], out[j]))?;
        }
        for i in last..cmp::min(k, lout.len()) {
            collector.add_clause(atomics::lit_impl_lit(lout[i], out[i]))?;
        }
        // both children contribute
        for i in 1..=cmp::min(k, lout.len()) {
            let min_j = cmp::max(last + 1, i + 1) - i;
            for j in min_j..=cmp::min(k - i, rout.len()) {
                collector.add_clause(atomics::cube_impl_lit(
                    &[lout[i - 1], rout[j - 1]],
                    out[i + j - 1],
                ))?;
            }
        }
        Ok(())
    }
}
