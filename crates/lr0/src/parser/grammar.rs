use std::{collections::HashMap, str::FromStr};

use lr0_util::make_type_idx;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type NT = usize;
pub type Term = usize;

/// Nonterminal introduced by augmentation; always the left side of production 0.
pub const AUGMENTED_NT: NT = 0;
pub const EOF_NAME: &str = "$";

// terminals and nonterminals are indices into the grammar's name tables
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Symbol {
    Terminal(Term),
    Nonterminal(NT),
    EOF,
}

impl Symbol {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Symbol::Nonterminal(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Production {
    Empty(NT),
    Nonempty(NT, Vec<Symbol>),
}

impl Production {
    pub fn nonterminal(&self) -> NT {
        match self {
            Production::Empty(nt) => *nt,
            Production::Nonempty(nt, _) => *nt,
        }
    }

    pub fn len(&self) -> usize {
        self.rhs().len()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Production::Empty(_))
    }

    pub fn rhs(&self) -> &[Symbol] {
        match self {
            Production::Empty(_) => &[],
            Production::Nonempty(_, rhs) => rhs,
        }
    }
}

make_type_idx!(
    #[derive(Serialize, Deserialize)]
    #[serde(transparent)]
    pub ProductionIdx,
    Production
);

pub const AUGMENTED_PRODUCTION: ProductionIdx = ProductionIdx::new(0);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("grammar contains no productions")]
    NoProductions,
    #[error("line {line}: production is missing its left-hand side")]
    MissingLeftHandSide { line: usize },
    #[error("line {line}: left-hand side `{lhs}` must be a single symbol other than `$`")]
    InvalidLeftHandSide { line: usize, lhs: String },
}

/// An augmented grammar. Production 0 is `S' -> S` where `S` is the left side
/// of the first source line; the rest follow in source order, one per alternative.
#[derive(Debug, Clone)]
pub struct Grammar {
    pub(super) productions: Vec<Production>,
    pub(super) goal_symbol: NT,
    pub(super) nonterminal_names: Vec<String>,
    pub(super) terminal_names: Vec<String>,
    // productions grouped by left side, in grammar order
    pub(super) nonterminal_productions: Vec<Vec<ProductionIdx>>,
    symbol_lookup: HashMap<String, Symbol>,
}

// one source line: left side plus its alternatives, each already tokenized
struct RawRule<'a> {
    lhs: &'a str,
    alternatives: Vec<Vec<&'a str>>,
}

fn find_arrow(line: &str) -> Option<(usize, usize)> {
    let arrow = line.find("->").map(|i| (i, 2));
    let bnf = line.find("::=").map(|i| (i, 3));
    match (arrow, bnf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn is_epsilon(alternative: &str) -> bool {
    matches!(alternative, "" | "ε" | "empty")
}

fn parse_rules(text: &str) -> Result<Vec<RawRule<'_>>, GrammarError> {
    let mut rules = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // lines without an arrow are not productions
        let Some((at, arrow_len)) = find_arrow(line) else {
            continue;
        };

        let lhs = line[..at].trim();
        if lhs.is_empty() {
            return Err(GrammarError::MissingLeftHandSide { line: i + 1 });
        }
        if lhs.split_whitespace().count() > 1 || lhs == EOF_NAME {
            return Err(GrammarError::InvalidLeftHandSide {
                line: i + 1,
                lhs: lhs.to_string(),
            });
        }

        let alternatives = line[at + arrow_len..]
            .split('|')
            .map(str::trim)
            .map(|alt| {
                if is_epsilon(alt) {
                    Vec::new()
                } else {
                    alt.split_whitespace().collect()
                }
            })
            .collect();

        rules.push(RawRule { lhs, alternatives });
    }

    if rules.is_empty() {
        return Err(GrammarError::NoProductions);
    }
    Ok(rules)
}

impl Grammar {
    fn from_rules(rules: &[RawRule<'_>]) -> Grammar {
        // the augmenting name must not collide with anything the user wrote
        let mut augmented_name = String::from("S'");
        let is_used = |name: &str| {
            rules.iter().any(|rule| {
                rule.lhs == name || rule.alternatives.iter().flatten().any(|s| *s == name)
            })
        };
        while is_used(&augmented_name) {
            augmented_name.push('\'');
        }

        // pass 1: every left side is a nonterminal
        let mut symbol_lookup: HashMap<String, Symbol> = HashMap::new();
        let mut nonterminal_names = vec![augmented_name.clone()];
        symbol_lookup.insert(augmented_name, Symbol::Nonterminal(AUGMENTED_NT));
        for rule in rules {
            if !symbol_lookup.contains_key(rule.lhs) {
                symbol_lookup.insert(
                    rule.lhs.to_string(),
                    Symbol::Nonterminal(nonterminal_names.len()),
                );
                nonterminal_names.push(rule.lhs.to_string());
            }
        }
        symbol_lookup.insert(EOF_NAME.to_string(), Symbol::EOF);

        // pass 2: everything else on a right side is a terminal
        let goal_symbol = 1;
        let mut terminal_names: Vec<String> = Vec::new();
        let mut productions = vec![Production::Nonempty(
            AUGMENTED_NT,
            vec![Symbol::Nonterminal(goal_symbol)],
        )];
        for rule in rules {
            let nt = match symbol_lookup[rule.lhs] {
                Symbol::Nonterminal(nt) => nt,
                _ => unreachable!("left sides are registered as nonterminals in pass 1"),
            };
            for alternative in &rule.alternatives {
                if alternative.is_empty() {
                    productions.push(Production::Empty(nt));
                    continue;
                }
                let rhs = alternative
                    .iter()
                    .map(|name| {
                        *symbol_lookup.entry(name.to_string()).or_insert_with(|| {
                            terminal_names.push(name.to_string());
                            Symbol::Terminal(terminal_names.len() - 1)
                        })
                    })
                    .collect();
                productions.push(Production::Nonempty(nt, rhs));
            }
        }

        let mut nonterminal_productions = vec![Vec::new(); nonterminal_names.len()];
        for (i, production) in productions.iter().enumerate() {
            nonterminal_productions[production.nonterminal()].push(ProductionIdx::new(i));
        }

        Grammar {
            productions,
            goal_symbol,
            nonterminal_names,
            terminal_names,
            nonterminal_productions,
            symbol_lookup,
        }
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn production(&self, index: ProductionIdx) -> &Production {
        &self.productions[index]
    }

    pub fn productions_of(&self, nt: NT) -> &[ProductionIdx] {
        &self.nonterminal_productions[nt]
    }

    pub fn n_nonterminals(&self) -> usize {
        self.nonterminal_names.len()
    }

    /// Terminal count, not including `$`.
    pub fn n_terminals(&self) -> usize {
        self.terminal_names.len()
    }

    pub fn goal_symbol(&self) -> NT {
        self.goal_symbol
    }

    pub fn symbol_name(&self, symbol: Symbol) -> &str {
        match symbol {
            Symbol::Terminal(t) => &self.terminal_names[t],
            Symbol::Nonterminal(nt) => &self.nonterminal_names[nt],
            Symbol::EOF => EOF_NAME,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.symbol_lookup.get(name).copied()
    }

    /// Like `lookup`, but nonterminal names yield `None`.
    pub fn lookup_terminal(&self, name: &str) -> Option<Symbol> {
        self.lookup(name).filter(Symbol::is_terminal)
    }

    /// All terminals in definition order, `$` last.
    pub fn terminals(&self) -> impl Iterator<Item = Symbol> + '_ {
        (0..self.n_terminals())
            .map(Symbol::Terminal)
            .chain(std::iter::once(Symbol::EOF))
    }

    /// All nonterminals except the augmenting one, in definition order.
    pub fn nonterminals(&self) -> impl Iterator<Item = Symbol> + '_ {
        (AUGMENTED_NT + 1..self.n_nonterminals()).map(Symbol::Nonterminal)
    }

    /// The symbols the automaton can transition on.
    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.terminals().chain(self.nonterminals())
    }

    /// Terminal columns for display: sorted by name with `$` last.
    pub fn terminal_columns(&self) -> Vec<Symbol> {
        let mut columns: Vec<Symbol> = (0..self.n_terminals()).map(Symbol::Terminal).collect();
        columns.sort_by(|a, b| self.symbol_name(*a).cmp(self.symbol_name(*b)));
        columns.push(Symbol::EOF);
        columns
    }

    pub fn nonterminal_columns(&self) -> Vec<Symbol> {
        let mut columns: Vec<Symbol> = self.nonterminals().collect();
        columns.sort_by(|a, b| self.symbol_name(*a).cmp(self.symbol_name(*b)));
        columns
    }

    pub fn production_to_text(&self, index: ProductionIdx) -> String {
        let production = &self.productions[index];
        let lhs = &self.nonterminal_names[production.nonterminal()];
        match production {
            Production::Empty(_) => format!("{} -> ε", lhs),
            Production::Nonempty(_, rhs) => {
                let rhs: Vec<&str> = rhs.iter().map(|s| self.symbol_name(*s)).collect();
                format!("{} -> {}", lhs, rhs.join(" "))
            }
        }
    }
}

impl FromStr for Grammar {
    type Err = GrammarError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let rules = parse_rules(text)?;
        Ok(Grammar::from_rules(&rules))
    }
}
