use crate::cir::{visit, CirGraph};

/// Recomputes the incoming calls of every block from the reachable graph.
///
/// Unreachable blocks end up with no incoming calls.
pub fn update_block_calls(graph: &mut CirGraph) {
    let mut sites = visit::block_call_sites(graph);
    let blocks: Vec<_> = graph.blocks().map(|(id, _)| id).collect();
    for block in blocks {
        let calls = sites.remove(&block).unwrap_or_default();
        graph.set_block_calls(block, calls);
    }
}
