use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::collection::{CanonicalCollection, StateIdx};
use super::grammar::{Grammar, ProductionIdx, Symbol, AUGMENTED_PRODUCTION, NT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LRAction {
    Shift(StateIdx),
    Reduce(ProductionIdx),
    Accept,
}

impl fmt::Display for LRAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LRAction::Shift(state) => write!(f, "s{}", state),
            LRAction::Reduce(production) => write!(f, "r{}", production),
            LRAction::Accept => write!(f, "acc"),
        }
    }
}

/// A table cell holding either one entry or, if several distinct entries
/// landed in it, all of them in the order they were first seen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell<A> {
    Single(A),
    Conflict(Vec<A>),
}

impl<A: Clone + PartialEq> Cell<A> {
    // returns true iff this insertion turned a single entry into a conflict
    fn insert(slot: &mut Option<Cell<A>>, value: A) -> bool {
        match slot {
            None => {
                *slot = Some(Cell::Single(value));
                false
            }
            Some(Cell::Single(existing)) => {
                if *existing == value {
                    return false;
                }
                let existing = existing.clone();
                *slot = Some(Cell::Conflict(vec![existing, value]));
                true
            }
            Some(Cell::Conflict(entries)) => {
                if !entries.contains(&value) {
                    entries.push(value);
                }
                false
            }
        }
    }

    pub fn entries(&self) -> &[A] {
        match self {
            Cell::Single(a) => std::slice::from_ref(a),
            Cell::Conflict(entries) => entries,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Cell::Conflict(_))
    }
}

impl<A: fmt::Display> fmt::Display for Cell<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Single(a) => write!(f, "{}", a),
            Cell::Conflict(entries) => {
                for (i, a) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, "/")?;
                    }
                    write!(f, "{}", a)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictKind {
    ShiftReduce,
    // `acc` on `$` next to a reduce of some other production
    AcceptReduce,
    ReduceReduce,
    // two GOTO targets for one nonterminal; a malformed automaton
    Goto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub state: StateIdx,
    pub symbol: Symbol,
    pub kind: ConflictKind,
}

// states = rows
// ACTION columns: terminals in grammar order, `$` last
// GOTO columns: nonterminals, including the (always empty) augmenting one
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LRTables {
    n_states: usize,
    n_terminals: usize,
    n_nonterminals: usize,
    action: Vec<Option<Cell<LRAction>>>,
    goto: Vec<Option<Cell<StateIdx>>>,
}

impl LRTables {
    fn terminal_column(&self, symbol: Symbol) -> Option<usize> {
        match symbol {
            Symbol::Terminal(t) => Some(t),
            Symbol::EOF => Some(self.n_terminals - 1),
            Symbol::Nonterminal(_) => None,
        }
    }

    fn column_terminal(&self, column: usize) -> Symbol {
        if column == self.n_terminals - 1 {
            Symbol::EOF
        } else {
            Symbol::Terminal(column)
        }
    }

    pub fn from_collection(grammar: &Grammar, collection: &CanonicalCollection) -> LRTables {
        let n_states = collection.len();
        let n_terminals = grammar.n_terminals() + 1;
        let n_nonterminals = grammar.n_nonterminals();
        let mut tables = LRTables {
            n_states,
            n_terminals,
            n_nonterminals,
            action: vec![None; n_states * n_terminals],
            goto: vec![None; n_states * n_nonterminals],
        };

        for (state, set) in collection.iter() {
            let row = state.index();
            // each symbol's target is looked up once per state
            let mut targets: HashMap<Symbol, Option<StateIdx>> = HashMap::new();

            for item in set {
                match item.next_symbol(grammar) {
                    Some(symbol) => {
                        let target = *targets
                            .entry(symbol)
                            .or_insert_with(|| collection.transition(grammar, state, symbol));
                        let Some(target) = target else {
                            warn!(
                                "I{} has no transition on {}; \
                                 was the collection built for this grammar?",
                                state,
                                grammar.symbol_name(symbol)
                            );
                            continue;
                        };
                        match symbol {
                            Symbol::Nonterminal(nt) => {
                                let slot = &mut tables.goto[row * n_nonterminals + nt];
                                if Cell::insert(slot, target) {
                                    warn!(
                                        "GOTO conflict in I{} on {}",
                                        state,
                                        grammar.symbol_name(symbol)
                                    );
                                }
                            }
                            terminal => {
                                let shift = LRAction::Shift(target);
                                tables.insert_action(grammar, state, terminal, shift);
                            }
                        }
                    }
                    None if item.production == AUGMENTED_PRODUCTION => {
                        tables.insert_action(grammar, state, Symbol::EOF, LRAction::Accept);
                    }
                    None => {
                        // no lookahead: reduce on every terminal
                        for terminal in grammar.terminals() {
                            let reduce = LRAction::Reduce(item.production);
                            tables.insert_action(grammar, state, terminal, reduce);
                        }
                    }
                }
            }
        }

        info!(
            "built tables for {} states, {} conflicts",
            n_states,
            tables.conflicts().len()
        );
        tables
    }

    fn insert_action(
        &mut self,
        grammar: &Grammar,
        state: StateIdx,
        terminal: Symbol,
        action: LRAction,
    ) {
        let Some(column) = self.terminal_column(terminal) else {
            return;
        };
        let slot = &mut self.action[state.index() * self.n_terminals + column];
        if Cell::insert(slot, action) {
            warn!(
                "ACTION conflict in I{} on {}: {}",
                state,
                grammar.symbol_name(terminal),
                slot.as_ref().map(|c| c.to_string()).unwrap_or_default()
            );
        }
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn action(&self, state: StateIdx, terminal: Symbol) -> Option<&Cell<LRAction>> {
        if state.index() >= self.n_states {
            return None;
        }
        let column = self.terminal_column(terminal)?;
        if column >= self.n_terminals {
            return None;
        }
        self.action[state.index() * self.n_terminals + column].as_ref()
    }

    pub fn goto(&self, state: StateIdx, nt: NT) -> Option<&Cell<StateIdx>> {
        if state.index() >= self.n_states || nt >= self.n_nonterminals {
            return None;
        }
        self.goto[state.index() * self.n_nonterminals + nt].as_ref()
    }

    /// Every conflicting cell, ACTION cells first, row by row.
    pub fn conflicts(&self) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (i, cell) in self.action.iter().enumerate() {
            let Some(Cell::Conflict(entries)) = cell else {
                continue;
            };
            let kind = if entries.iter().any(|a| matches!(a, LRAction::Shift(_))) {
                ConflictKind::ShiftReduce
            } else if entries.contains(&LRAction::Accept) {
                ConflictKind::AcceptReduce
            } else {
                ConflictKind::ReduceReduce
            };
            conflicts.push(Conflict {
                state: StateIdx::new(i / self.n_terminals),
                symbol: self.column_terminal(i % self.n_terminals),
                kind,
            });
        }
        for (i, cell) in self.goto.iter().enumerate() {
            if cell.as_ref().is_some_and(Cell::is_conflict) {
                conflicts.push(Conflict {
                    state: StateIdx::new(i / self.n_nonterminals),
                    symbol: Symbol::Nonterminal(i % self.n_nonterminals),
                    kind: ConflictKind::Goto,
                });
            }
        }
        conflicts
    }

    pub fn is_lr0(&self) -> bool {
        !self.action.iter().flatten().any(Cell::is_conflict)
            && !self.goto.iter().flatten().any(Cell::is_conflict)
    }

    /// Plain-text rendering, one row per state.
    pub fn to_text(&self, grammar: &Grammar) -> String {
        let terminals = grammar.terminal_columns();
        let nonterminals = grammar.nonterminal_columns();

        let mut header = vec!["State".to_string()];
        header.extend(terminals.iter().map(|t| grammar.symbol_name(*t).to_string()));
        header.extend(nonterminals.iter().map(|nt| grammar.symbol_name(*nt).to_string()));

        let mut rows = vec![header];
        for row in 0..self.n_states {
            let state = StateIdx::new(row);
            let mut cells = vec![format!("I{}", state)];
            cells.extend(terminals.iter().map(|t| {
                self.action(state, *t).map(|c| c.to_string()).unwrap_or_default()
            }));
            cells.extend(nonterminals.iter().map(|nt| match nt {
                Symbol::Nonterminal(nt) => {
                    self.goto(state, *nt).map(|c| c.to_string()).unwrap_or_default()
                }
                _ => String::new(),
            }));
            rows.push(cells);
        }

        let n_columns = rows[0].len();
        let widths: Vec<usize> = (0..n_columns)
            .map(|c| rows.iter().map(|r| r[c].chars().count()).max().unwrap_or(0))
            .collect();

        let mut out = String::new();
        for (i, row) in rows.iter().enumerate() {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
                .collect();
            out.push_str(line.join(" | ").trim_end());
            out.push('\n');
            if i == 0 {
                let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
                out.push_str(&rule.join("-+-"));
                out.push('\n');
            }
        }
        out
    }
}
