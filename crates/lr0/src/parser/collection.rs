use std::collections::HashMap;

use lr0_util::make_type_idx;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::grammar::{Grammar, Symbol, AUGMENTED_PRODUCTION};
use super::item::{closure, goto, Item, ItemSet};

make_type_idx!(
    #[derive(Serialize, Deserialize)]
    #[serde(transparent)]
    pub StateIdx,
    ItemSet
);

pub const INITIAL_STATE: StateIdx = StateIdx::new(0);

/// The canonical LR(0) collection. States are numbered in creation order and
/// no two states hold the same item set.
#[derive(Debug, Clone, Default)]
pub struct CanonicalCollection {
    states: Vec<ItemSet>,
    index: HashMap<ItemSet, StateIdx>,
}

impl CanonicalCollection {
    pub fn build(grammar: &Grammar) -> CanonicalCollection {
        let mut collection = CanonicalCollection::default();
        collection.insert(closure(grammar, [Item::start(AUGMENTED_PRODUCTION)]));

        // states appended while scanning are picked up by the same cursor
        let mut cursor = 0;
        while cursor < collection.states.len() {
            let current = StateIdx::new(cursor);
            for symbol in grammar.symbols() {
                let target = goto(grammar, &collection.states[current], symbol);
                if target.is_empty() || collection.index.contains_key(&target) {
                    continue;
                }
                let new_state = collection.insert(target);
                debug!(
                    "I{} --{}--> I{} (new, {} items)",
                    current,
                    grammar.symbol_name(symbol),
                    new_state,
                    collection.states[new_state].len()
                );
            }
            cursor += 1;
        }

        info!("canonical collection has {} states", collection.states.len());
        collection
    }

    fn insert(&mut self, set: ItemSet) -> StateIdx {
        let idx = StateIdx::from_push(&mut self.states, set.clone());
        self.index.insert(set, idx);
        idx
    }

    pub fn states(&self) -> &[ItemSet] {
        &self.states
    }

    pub fn state(&self, state: StateIdx) -> &ItemSet {
        &self.states[state]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateIdx, &ItemSet)> {
        self.states
            .iter()
            .enumerate()
            .map(|(i, set)| (StateIdx::new(i), set))
    }

    pub fn index_of(&self, set: &ItemSet) -> Option<StateIdx> {
        self.index.get(set).copied()
    }

    /// Target of `from` on `symbol`, recomputed through `goto` and looked up
    /// by content.
    pub fn transition(
        &self,
        grammar: &Grammar,
        from: StateIdx,
        symbol: Symbol,
    ) -> Option<StateIdx> {
        let target = goto(grammar, &self.states[from], symbol);
        if target.is_empty() {
            return None;
        }
        self.index_of(&target)
    }

    pub fn transitions(&self, grammar: &Grammar, from: StateIdx) -> Vec<(Symbol, StateIdx)> {
        grammar
            .symbols()
            .filter_map(|symbol| {
                self.transition(grammar, from, symbol)
                    .map(|to| (symbol, to))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::parser::grammar::ProductionIdx;

    fn grammar(text: &str) -> Grammar {
        text.parse().unwrap()
    }

    #[test]
    fn test_initial_state_is_start_closure() {
        let g = grammar("E -> E + T | T\nT -> id");
        let collection = CanonicalCollection::build(&g);
        assert_eq!(
            collection.state(INITIAL_STATE),
            &closure(&g, [Item::start(AUGMENTED_PRODUCTION)])
        );
    }

    #[test]
    fn test_expression_collection() {
        let g = grammar("E -> E + T | T\nT -> id");
        let collection = CanonicalCollection::build(&g);
        // I0, E, T, id, E +, E + T
        assert_eq!(collection.len(), 6);

        let distinct: HashSet<&ItemSet> = collection.states().iter().collect();
        assert_eq!(distinct.len(), collection.len());
    }

    #[test]
    fn test_every_transition_is_in_collection() {
        let g = grammar("S -> ( S ) | x\n");
        let collection = CanonicalCollection::build(&g);
        for (state, set) in collection.iter() {
            for symbol in g.symbols() {
                let target = goto(&g, set, symbol);
                if !target.is_empty() {
                    assert!(
                        collection.index_of(&target).is_some(),
                        "missing target of I{} on {}",
                        state,
                        g.symbol_name(symbol)
                    );
                }
            }
        }
    }

    #[test]
    fn test_shared_targets_are_deduplicated() {
        // both `(` transitions lead to the same state
        let g = grammar("S -> ( S ) | x");
        let collection = CanonicalCollection::build(&g);
        let open = g.lookup("(").unwrap();
        let after_open = collection.transition(&g, INITIAL_STATE, open).unwrap();
        assert_eq!(collection.transition(&g, after_open, open), Some(after_open));
        assert_eq!(collection.len(), 6);
    }

    #[test]
    fn test_epsilon_reduce_in_initial_state() {
        let g = grammar("S -> a S | ε");
        let collection = CanonicalCollection::build(&g);
        let i0 = collection.state(INITIAL_STATE);
        let epsilon = Item::new(ProductionIdx::new(2), 0);
        assert!(i0.contains(&epsilon));
        assert!(epsilon.is_complete(&g));
    }

    #[test]
    fn test_build_is_deterministic() {
        let g = grammar("S -> A B | a c\nA -> a\nB -> b");
        let first = CanonicalCollection::build(&g);
        let second = CanonicalCollection::build(&g);
        assert_eq!(first.states(), second.states());
    }

    #[test]
    fn test_state_set_independent_of_symbol_order() {
        // same grammar, symbols first seen in a different order
        let a = grammar("S -> x S y | z");
        let b = grammar("S -> z | x S y");
        let sets = |g: &Grammar| -> HashSet<Vec<String>> {
            CanonicalCollection::build(g)
                .states()
                .iter()
                .map(|set| {
                    let mut items: Vec<String> = set.iter().map(|i| i.to_text(g)).collect();
                    items.sort();
                    items
                })
                .collect()
        };
        assert_eq!(sets(&a), sets(&b));
    }
}
