use thiserror::Error;

use super::cfg::{CfgBlock, ControlFlowGraph, OpPos, Operation, RPOWorklist};
use super::domains::JoinSemiLattice;

/// Transfer functions need to implement this trait and define either
/// [`TransferFunction::block`] or [`TransferFunction::operation`].
pub trait TransferFunction<Cfg, D>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
{
    /// Apply the effects of traversing an edge. Returning `None` marks the
    /// edge infeasible.
    fn edge(
        &mut self,
        _from: usize,
        _to: usize,
        _cfg: &Cfg,
        _ctx: &D::LatticeContext,
        pre_state: &D,
    ) -> Option<D> {
        Some(pre_state.clone())
    }

    /// Apply the effects of a whole block. The default implementation folds
    /// [`TransferFunction::operation`] over the operations of the block.
    fn block(&mut self, block_id: usize, cfg: &Cfg, ctx: &D::LatticeContext, pre_state: &D) -> D {
        let mut post_state = pre_state.clone();
        for (op_id, op) in cfg.blocks()[block_id].operations().iter().enumerate() {
            post_state = self.operation(OpPos { block_id, op_id }, op, cfg, ctx, &post_state);
        }
        post_state
    }

    /// Apply the effects of a single operation.
    fn operation(
        &mut self,
        _pos: OpPos,
        _op: &Operation<Cfg>,
        _cfg: &Cfg,
        _ctx: &D::LatticeContext,
        pre_state: &D,
    ) -> D {
        pre_state.clone()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("the solver did not converge within {limit} block visits")]
    StepLimit { limit: usize },
}

/// Analysis states at the boundaries of every block, together with the
/// amount of work it took to compute them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution<D> {
    pub pre_states: Vec<D>,
    pub post_states: Vec<D>,
    /// Blocks never reached from the entry keep the bottom state.
    pub reached: Vec<bool>,
    pub steps: usize,
}

impl<D: JoinSemiLattice> Solution<D> {
    /// Replay the transfer function over every reached block and hand out the
    /// state right before each operation, in block order.
    pub fn for_each_operation<Cfg, F, V>(
        &self,
        cfg: &Cfg,
        ctx: &D::LatticeContext,
        transfer: &mut F,
        mut visit: V,
    ) where
        Cfg: ControlFlowGraph,
        F: TransferFunction<Cfg, D>,
        V: FnMut(OpPos, &Operation<Cfg>, &D),
    {
        for (block_id, block) in cfg.blocks().iter().enumerate() {
            if !self.reached[block_id] {
                continue;
            }
            let mut state = self.pre_states[block_id].clone();
            for (op_id, op) in block.operations().iter().enumerate() {
                let pos = OpPos { block_id, op_id };
                visit(pos, op, &state);
                state = transfer.operation(pos, op, cfg, ctx, &state);
            }
        }
    }
}

/// A worklist solver for monotone transfer functions over lattices without
/// infinite ascending chains. Blocks are visited in reverse post order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SolveMonotone {
    /// Upper bound on the number of block visits. `None` means the solver
    /// runs until the fixed point is reached.
    pub step_limit: Option<usize>,
}

impl SolveMonotone {
    /// Run the solver from the entry block.
    ///
    /// # Arguments
    ///
    /// * `seed` - The state on entry, e.g. the locks held by every caller.
    /// * `transfer` - Function to apply the effects of blocks, edges, operations.
    pub fn solve<Cfg, D, F>(
        &self,
        cfg: &Cfg,
        seed: D,
        ctx: &D::LatticeContext,
        transfer: &mut F,
    ) -> Result<Solution<D>, SolverError>
    where
        Cfg: ControlFlowGraph,
        D: JoinSemiLattice,
        F: TransferFunction<Cfg, D>,
    {
        let node_num = cfg.blocks().len();
        let mut solution = Solution {
            pre_states: vec![D::bottom(ctx); node_num],
            post_states: vec![D::bottom(ctx); node_num],
            reached: vec![false; node_num],
            steps: 0,
        };
        if node_num == 0 {
            return Ok(solution);
        }

        let mut worklist = RPOWorklist::new(cfg);
        worklist.push(0);
        while let Some(current) = worklist.pop() {
            if let Some(limit) = self.step_limit {
                if solution.steps >= limit {
                    return Err(SolverError::StepLimit { limit });
                }
            }
            solution.steps += 1;

            // The entry can be a loop head, its seed takes part in the merge.
            let mut pre_state = if current == 0 {
                seed.clone()
            } else {
                D::bottom(ctx)
            };
            for &pred in cfg.blocks()[current].predecessors() {
                if !solution.reached[pred] {
                    continue;
                }
                let pred_state = &solution.post_states[pred];
                if let Some(transferred) = transfer.edge(pred, current, cfg, ctx, pred_state) {
                    pre_state = pre_state.join(&transferred, ctx);
                }
            }
            let post_state = transfer.block(current, cfg, ctx, &pre_state);
            solution.pre_states[current] = pre_state;

            if solution.reached[current] && solution.post_states[current] == post_state {
                continue;
            }
            solution.reached[current] = true;
            solution.post_states[current] = post_state;
            worklist.push_successors(current, cfg);
        }
        Ok(solution)
    }
}
