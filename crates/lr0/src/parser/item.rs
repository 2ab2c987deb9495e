use std::collections::{BTreeSet, VecDeque};

use bit_set::BitSet;
use serde::{Deserialize, Serialize};

use super::grammar::{Grammar, ProductionIdx, Symbol, AUGMENTED_PRODUCTION};

/// A dotted production: `dot` counts the right-side symbols already matched.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Item {
    pub production: ProductionIdx,
    pub dot: usize,
}

impl Item {
    pub fn new(production: ProductionIdx, dot: usize) -> Item {
        Item { production, dot }
    }

    pub fn start(production: ProductionIdx) -> Item {
        Item { production, dot: 0 }
    }

    pub fn next_symbol(&self, grammar: &Grammar) -> Option<Symbol> {
        grammar.production(self.production).rhs().get(self.dot).copied()
    }

    pub fn is_complete(&self, grammar: &Grammar) -> bool {
        self.dot >= grammar.production(self.production).len()
    }

    /// Kernel items are the ones a state is reached with: the start item and
    /// every item whose dot has moved.
    pub fn is_kernel(&self) -> bool {
        self.dot > 0 || self.production == AUGMENTED_PRODUCTION
    }

    fn advance(&self) -> Item {
        Item {
            dot: self.dot + 1,
            ..*self
        }
    }

    /// `A -> a · b`; an epsilon production renders as `A -> ·`.
    pub fn to_text(&self, grammar: &Grammar) -> String {
        let production = grammar.production(self.production);
        let lhs = grammar.symbol_name(Symbol::Nonterminal(production.nonterminal()));
        let mut rhs: Vec<&str> = production
            .rhs()
            .iter()
            .map(|s| grammar.symbol_name(*s))
            .collect();
        rhs.insert(self.dot.min(rhs.len()), "·");
        format!("{} -> {}", lhs, rhs.join(" "))
    }
}

/// A set of items. Equality and hashing depend only on membership, so two sets
/// built in different orders are the same automaton state.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemSet(BTreeSet<Item>);

impl ItemSet {
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, item: &Item) -> bool {
        self.0.contains(item)
    }

    /// Kernel items first, then closure items in the order `closure` predicts
    /// them. Items no prediction reaches go last.
    pub fn display_order(&self, grammar: &Grammar) -> Vec<Item> {
        let mut order: Vec<Item> = self.iter().copied().filter(Item::is_kernel).collect();
        let mut listed: BTreeSet<Item> = order.iter().copied().collect();
        let mut predicted = BitSet::with_capacity(grammar.n_nonterminals());

        let mut cursor = 0;
        while cursor < order.len() {
            let item = order[cursor];
            cursor += 1;
            let Some(Symbol::Nonterminal(nt)) = item.next_symbol(grammar) else {
                continue;
            };
            if !predicted.insert(nt) {
                continue;
            }
            for production in grammar.productions_of(nt) {
                let start = Item::start(*production);
                if self.contains(&start) && listed.insert(start) {
                    order.push(start);
                }
            }
        }

        order.extend(self.iter().filter(|item| !listed.contains(*item)));
        order
    }

    pub fn to_text(&self, grammar: &Grammar) -> String {
        let lines: Vec<String> = self
            .display_order(grammar)
            .iter()
            .map(|item| item.to_text(grammar))
            .collect();
        lines.join("\n")
    }
}

impl FromIterator<Item> for ItemSet {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        ItemSet(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ItemSet {
    type Item = &'a Item;
    type IntoIter = std::collections::btree_set::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

pub fn closure(grammar: &Grammar, kernel: impl IntoIterator<Item = Item>) -> ItemSet {
    let mut items: BTreeSet<Item> = BTreeSet::new();
    let mut queue: VecDeque<Item> = VecDeque::new();
    for item in kernel {
        if items.insert(item) {
            queue.push_back(item);
        }
    }

    // a nonterminal only needs to be predicted once per closure
    let mut predicted = BitSet::with_capacity(grammar.n_nonterminals());
    while let Some(item) = queue.pop_front() {
        let Some(Symbol::Nonterminal(nt)) = item.next_symbol(grammar) else {
            continue;
        };
        if !predicted.insert(nt) {
            continue;
        }
        for production in grammar.productions_of(nt) {
            let new_item = Item::start(*production);
            if items.insert(new_item) {
                queue.push_back(new_item);
            }
        }
    }

    ItemSet(items)
}

/// Items of `set` with the dot before `symbol`, advanced and closed.
/// An empty result means there is no transition.
pub fn goto(grammar: &Grammar, set: &ItemSet, symbol: Symbol) -> ItemSet {
    let kernel: Vec<Item> = set
        .iter()
        .filter(|item| item.next_symbol(grammar) == Some(symbol))
        .map(Item::advance)
        .collect();

    if kernel.is_empty() {
        return ItemSet::default();
    }
    closure(grammar, kernel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::grammar::AUGMENTED_PRODUCTION;

    fn expression_grammar() -> Grammar {
        "E -> E + T | T\nT -> id".parse().unwrap()
    }

    fn item(production: usize, dot: usize) -> Item {
        Item::new(ProductionIdx::new(production), dot)
    }

    #[test]
    fn test_initial_closure() {
        let g = expression_grammar();
        let i0 = closure(&g, [Item::start(AUGMENTED_PRODUCTION)]);
        let expected: ItemSet = [item(0, 0), item(1, 0), item(2, 0), item(3, 0)]
            .into_iter()
            .collect();
        assert_eq!(i0, expected);
    }

    #[test]
    fn test_closure_ignores_terminals_and_complete_items() {
        let g = expression_grammar();
        let set = closure(&g, [item(1, 1), item(3, 1)]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&item(1, 1)));
        assert!(set.contains(&item(3, 1)));
    }

    #[test]
    fn test_itemset_equality_ignores_order() {
        let a: ItemSet = [item(2, 0), item(1, 0), item(0, 0)].into_iter().collect();
        let b: ItemSet = [item(0, 0), item(2, 0), item(1, 0), item(1, 0)].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_goto() {
        let g = expression_grammar();
        let i0 = closure(&g, [Item::start(AUGMENTED_PRODUCTION)]);
        let plus = g.lookup("+").unwrap();
        let e = g.lookup("E").unwrap();

        let on_e = goto(&g, &i0, e);
        let expected: ItemSet = [item(0, 1), item(1, 1)].into_iter().collect();
        assert_eq!(on_e, expected);

        let after_plus = goto(&g, &on_e, plus);
        let expected: ItemSet = [item(1, 2), item(3, 0)].into_iter().collect();
        assert_eq!(after_plus, expected);

        assert!(goto(&g, &i0, plus).is_empty());
    }

    #[test]
    fn test_epsilon_item_is_complete_at_start() {
        let g: Grammar = "S -> a S | ε".parse().unwrap();
        let i0 = closure(&g, [Item::start(AUGMENTED_PRODUCTION)]);
        let epsilon = item(2, 0);
        assert!(i0.contains(&epsilon));
        assert!(epsilon.is_complete(&g));
        assert_eq!(epsilon.to_text(&g), "S -> ·");
    }

    #[test]
    fn test_kernel_items_listed_first() {
        let g: Grammar = "S -> x A\nA -> S | y".parse().unwrap();
        let i0 = closure(&g, [Item::start(AUGMENTED_PRODUCTION)]);
        let after_x = goto(&g, &i0, g.lookup("x").unwrap());
        assert!(item(1, 1).is_kernel());
        assert!(!item(1, 0).is_kernel());
        assert_eq!(
            after_x.to_text(&g),
            "S -> x · A\nA -> · S\nA -> · y\nS -> · x A"
        );
        assert_eq!(after_x.display_order(&g).len(), after_x.len());
    }

    #[test]
    fn test_item_text() {
        let g = expression_grammar();
        assert_eq!(item(1, 0).to_text(&g), "E -> · E + T");
        assert_eq!(item(1, 2).to_text(&g), "E -> E + · T");
        assert_eq!(item(1, 3).to_text(&g), "E -> E + T ·");

        let set: ItemSet = [item(0, 1), item(1, 1)].into_iter().collect();
        assert_eq!(set.to_text(&g), "S' -> E ·\nE -> E · + T");
    }
}
