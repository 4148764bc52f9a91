use core::cmp::Reverse;
use core::fmt::Write;

use priority_queue::PriorityQueue;

pub trait CfgBlock {
    type Operation;

    fn operations(&self) -> &[Self::Operation];
    fn successors(&self) -> &[usize];
    fn predecessors(&self) -> &[usize];
}

/// Block 0 is the entry of every graph.
pub trait ControlFlowGraph {
    type Block: CfgBlock;

    fn blocks(&self) -> &[Self::Block];
}

pub type Operation<Cfg> = <<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation;

/// Position of an operation inside a control flow graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpPos {
    pub block_id: usize,
    pub op_id: usize,
}

/// Blocks reachable from the entry in reverse post order. Successors are
/// explored last to first, so siblings keep the order they were declared in.
pub fn reverse_post_order<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Vec<usize> {
    let blocks = cfg.blocks();
    let mut post_order = Vec::with_capacity(blocks.len());
    if blocks.is_empty() {
        return post_order;
    }

    let mut visited = vec![false; blocks.len()];
    visited[0] = true;
    let mut stack = vec![(0_usize, blocks[0].successors().len())];
    while let Some(top) = stack.last_mut() {
        let node = top.0;
        if top.1 == 0 {
            stack.pop();
            post_order.push(node);
            continue;
        }
        top.1 -= 1;
        let next = blocks[node].successors()[top.1];
        if !visited[next] {
            visited[next] = true;
            stack.push((next, blocks[next].successors().len()));
        }
    }
    post_order.reverse();
    post_order
}

/// A worklist that always hands out the queued block earliest in reverse
/// post order. Every block is queued at most once at a time.
pub struct RPOWorklist {
    queue: PriorityQueue<usize, Reverse<usize>>,
    rpo_order: Vec<usize>,
}

impl RPOWorklist {
    pub fn new<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Self {
        // Unreachable blocks go after every reachable one.
        let mut rpo_order = vec![usize::MAX; cfg.blocks().len()];
        for (order, block) in reverse_post_order(cfg).into_iter().enumerate() {
            rpo_order[block] = order;
        }
        Self {
            queue: PriorityQueue::new(),
            rpo_order,
        }
    }

    pub fn get_rpo_order(&self, block: usize) -> usize {
        self.rpo_order[block]
    }

    pub fn push(&mut self, block: usize) {
        self.queue.push(block, Reverse(self.rpo_order[block]));
    }

    pub fn push_successors<Cfg: ControlFlowGraph>(&mut self, block: usize, cfg: &Cfg) {
        for &next in cfg.blocks()[block].successors() {
            self.push(next);
        }
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.queue.pop().map(|(block, _)| block)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Render the graph in graphviz format.
pub fn print<Cfg, OpPrinter>(name: Option<&str>, cfg: &Cfg, printer: OpPrinter) -> String
where
    Cfg: ControlFlowGraph,
    OpPrinter: Fn(&Operation<Cfg>) -> String,
{
    let mut output = format!("digraph {} {{\n", name.unwrap_or("CFG"));
    for (counter, block) in cfg.blocks().iter().enumerate() {
        let text: Vec<_> = block.operations().iter().map(&printer).collect();
        let _ = writeln!(output, "  Node_{counter}[label=\"{}\"]", text.join("\\n"));
    }
    output.push('\n');
    for (counter, block) in cfg.blocks().iter().enumerate() {
        for next in block.successors() {
            let _ = writeln!(output, "  Node_{counter} -> Node_{next}");
        }
    }
    output.push_str("}\n");
    output
}
