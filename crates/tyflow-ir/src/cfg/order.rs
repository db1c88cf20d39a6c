use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::{Block, CfgError, CodeConstant, CodeInfo, OrderedCode};

/// Links the blocks and computes the ancestors-first order.
///
/// Every block is connected to the lexically next block when its last
/// instruction falls through, to the blocks at its last instruction's
/// `target` and `block_target`, and to the block at its first instruction's
/// `target` when that instruction is a block opener sharing its block with
/// later instructions. The order is the reverse postorder of a depth-first
/// walk from the entry, so a block precedes each of its successors except
/// along loop back edges.
pub(crate) fn order(
    info: CodeInfo,
    consts: Vec<CodeConstant>,
    mut blocks: Vec<Block>,
) -> Result<OrderedCode, CfgError> {
    let starts: FxHashMap<usize, usize> = blocks
        .iter()
        .enumerate()
        .map(|(pos, block)| (block.id().index(), pos))
        .collect();
    let lookup = |index: usize, target: usize| {
        starts
            .get(&target)
            .copied()
            .ok_or(CfgError::MissingTarget { index, target })
    };

    let mut edges: Vec<SmallVec<[usize; 3]>> = Vec::with_capacity(blocks.len());
    for (pos, block) in blocks.iter().enumerate() {
        let mut out: SmallVec<[usize; 3]> = SmallVec::new();
        let mut link = |succ: usize| {
            if !out.contains(&succ) {
                out.push(succ);
            }
        };
        let (first, last) = (block.first(), block.last());
        if last.falls_through() && pos + 1 < blocks.len() {
            link(pos + 1);
        }
        if block.len() > 1 {
            if let Some(target) = first.target {
                link(lookup(first.index, target)?);
            }
        }
        if let Some(target) = last.target {
            link(lookup(last.index, target)?);
        }
        if let Some(target) = last.block_target {
            link(lookup(last.index, target)?);
        }
        edges.push(out);
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(blocks.len(), blocks.len() * 2);
    let nodes: Vec<NodeIndex> = (0..blocks.len()).map(|pos| graph.add_node(pos)).collect();
    for (pos, out) in edges.iter().enumerate() {
        // neighbours are visited newest first; adding edges in reverse makes
        // the fallthrough successor the first one placed after its block
        for &succ in out.iter().rev() {
            graph.add_edge(nodes[pos], nodes[succ], ());
        }
    }

    let mut postorder = Vec::with_capacity(blocks.len());
    let mut dfs = DfsPostOrder::new(&graph, nodes[0]);
    while let Some(node) = dfs.next(&graph) {
        postorder.push(graph[node]);
    }
    let reachable: FxHashSet<usize> = postorder.iter().copied().collect();

    for (pos, out) in edges.into_iter().enumerate() {
        if !reachable.contains(&pos) {
            continue;
        }
        let id = blocks[pos].id();
        for succ in out {
            let succ_id = blocks[succ].id();
            blocks[pos].outgoing.insert(succ_id);
            blocks[succ].incoming.insert(id);
        }
    }

    let order = postorder.iter().rev().map(|&pos| blocks[pos].id()).collect();
    let dead: Vec<_> = blocks
        .iter()
        .enumerate()
        .filter(|(pos, _)| !reachable.contains(pos))
        .map(|(_, block)| block.id())
        .collect();
    tracing::debug!(
        code = %info.name,
        blocks = blocks.len(),
        dead = dead.len(),
        "built control-flow graph"
    );
    Ok(OrderedCode::new(info, consts, blocks, order, dead))
}
