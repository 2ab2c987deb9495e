use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Graph;

use super::collection::CanonicalCollection;
use super::grammar::Grammar;

/// One node per state, labelled `I<n>` followed by its items; one edge per
/// transition, labelled with its symbol.
pub fn automaton_graph(
    grammar: &Grammar,
    collection: &CanonicalCollection,
) -> Graph<String, String> {
    let mut graph: Graph<String, String> = DiGraph::new();
    let nodes: Vec<NodeIndex> = collection
        .iter()
        .map(|(state, set)| graph.add_node(format!("I{}\n{}", state, set.to_text(grammar))))
        .collect();

    for (state, _) in collection.iter() {
        for (symbol, to) in collection.transitions(grammar, state) {
            graph.add_edge(
                nodes[state.index()],
                nodes[to.index()],
                grammar.symbol_name(symbol).to_string(),
            );
        }
    }
    graph
}
