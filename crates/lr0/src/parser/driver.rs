use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use super::collection::{StateIdx, INITIAL_STATE};
use super::grammar::{Grammar, ProductionIdx, Symbol, EOF_NAME};
use super::table::{Cell, LRAction, LRTables};

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyzeError {
    #[error("input is empty")]
    EmptyInput,
    #[error("parse tables have not been constructed")]
    TablesNotConstructed,
    #[error("syntax error: no action in state I{state} on symbol `{symbol}`")]
    NoAction { state: StateIdx, symbol: String },
    #[error(
        "ambiguous action in state I{state} on symbol `{symbol}`: {}",
        display_actions(.actions)
    )]
    AmbiguousAction {
        state: StateIdx,
        symbol: String,
        actions: Vec<LRAction>,
    },
    #[error("syntax error: input continues after `$` in state I{state} at `{symbol}`")]
    TrailingInput { state: StateIdx, symbol: String },
    #[error("cannot reduce `{rule}`: only {depth} symbols on the stack")]
    StackUnderflow { rule: String, depth: usize },
    #[error("no GOTO entry in state I{state} for `{nonterminal}`")]
    MissingGoto { state: StateIdx, nonterminal: String },
    #[error("ambiguous GOTO entry in state I{state} for `{nonterminal}`")]
    AmbiguousGoto { state: StateIdx, nonterminal: String },
}

fn display_actions(actions: &[LRAction]) -> String {
    let actions: Vec<String> = actions.iter().map(LRAction::to_string).collect();
    actions.join("/")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    Shift { symbol: Symbol, state: StateIdx },
    Reduce { production: ProductionIdx, goto: StateIdx },
    Accept,
    Error(AnalyzeError),
}

impl StepAction {
    pub fn to_text(&self, grammar: &Grammar) -> String {
        match self {
            StepAction::Shift { symbol, state } => {
                format!("shift {}, goto I{}", grammar.symbol_name(*symbol), state)
            }
            StepAction::Reduce { production, goto } => {
                format!("reduce {}, goto I{}", grammar.production_to_text(*production), goto)
            }
            StepAction::Accept => "accept".to_string(),
            StepAction::Error(e) => format!("error: {}", e),
        }
    }
}

/// Snapshot of the machine taken before `action` was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStep {
    pub step: usize,
    pub state_stack: Vec<StateIdx>,
    pub symbol_stack: Vec<Symbol>,
    pub input: Vec<String>,
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub success: bool,
    pub message: String,
    pub steps: Vec<ParseStep>,
    pub error: Option<AnalyzeError>,
}

impl Analysis {
    pub(super) fn failed(error: AnalyzeError, steps: Vec<ParseStep>) -> Analysis {
        Analysis {
            success: false,
            message: error.to_string(),
            steps,
            error: Some(error),
        }
    }

    fn accepted(steps: Vec<ParseStep>) -> Analysis {
        Analysis {
            success: true,
            message: "accepted: input is a sentence of the grammar".to_string(),
            steps,
            error: None,
        }
    }
}

struct Machine<'a> {
    grammar: &'a Grammar,
    tables: &'a LRTables,
    tokens: Vec<&'a str>,
    cursor: usize,
    state_stack: Vec<StateIdx>,
    symbol_stack: Vec<Symbol>,
    steps: Vec<ParseStep>,
}

impl<'a> Machine<'a> {
    fn top(&self) -> StateIdx {
        // the initial state is never popped
        self.state_stack[self.state_stack.len() - 1]
    }

    fn record(&mut self, action: StepAction) {
        let step = ParseStep {
            step: self.steps.len() + 1,
            state_stack: self.state_stack.clone(),
            symbol_stack: self.symbol_stack.clone(),
            input: self.tokens[self.cursor.min(self.tokens.len())..]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            action,
        };
        trace!(
            "step {}: states {:?}, action {}",
            step.step,
            step.state_stack.iter().map(|s| s.index()).collect::<Vec<_>>(),
            step.action.to_text(self.grammar)
        );
        self.steps.push(step);
    }

    fn fail(mut self, error: AnalyzeError) -> Analysis {
        self.record(StepAction::Error(error.clone()));
        Analysis::failed(error, self.steps)
    }

    fn run(mut self) -> Analysis {
        let grammar = self.grammar;
        let tables = self.tables;
        loop {
            let state = self.top();
            // shifting a user-written `$` can run past the sentinel
            let name = self.tokens.get(self.cursor).copied().unwrap_or(EOF_NAME);
            let no_action = || AnalyzeError::NoAction {
                state,
                symbol: name.to_string(),
            };
            if self.cursor >= self.tokens.len() {
                return self.fail(no_action());
            }

            let Some(symbol) = grammar.lookup_terminal(name) else {
                return self.fail(no_action());
            };
            let action = match tables.action(state, symbol) {
                Some(Cell::Single(action)) => *action,
                Some(Cell::Conflict(actions)) => {
                    let error = AnalyzeError::AmbiguousAction {
                        state,
                        symbol: name.to_string(),
                        actions: actions.clone(),
                    };
                    return self.fail(error);
                }
                None => return self.fail(no_action()),
            };

            match action {
                LRAction::Accept => {
                    // only the appended end marker may be accepted
                    if let Some(next) = self.tokens.get(self.cursor + 1) {
                        let error = AnalyzeError::TrailingInput {
                            state,
                            symbol: next.to_string(),
                        };
                        return self.fail(error);
                    }
                    self.record(StepAction::Accept);
                    return Analysis::accepted(self.steps);
                }
                LRAction::Shift(next) => {
                    self.record(StepAction::Shift { symbol, state: next });
                    self.state_stack.push(next);
                    self.symbol_stack.push(symbol);
                    self.cursor += 1;
                }
                LRAction::Reduce(production_idx) => {
                    let production = grammar.production(production_idx);
                    let pop_count = production.len();
                    let depth = self.state_stack.len() - 1;
                    if pop_count > depth {
                        let error = AnalyzeError::StackUnderflow {
                            rule: grammar.production_to_text(production_idx),
                            depth,
                        };
                        return self.fail(error);
                    }

                    let lhs = production.nonterminal();
                    let keep = self.state_stack.len() - pop_count;
                    let exposed = self.state_stack[keep - 1];
                    let nonterminal = || grammar.symbol_name(Symbol::Nonterminal(lhs)).to_string();
                    let goto = match tables.goto(exposed, lhs) {
                        Some(Cell::Single(goto)) => *goto,
                        Some(Cell::Conflict(_)) => {
                            let error = AnalyzeError::AmbiguousGoto {
                                state: exposed,
                                nonterminal: nonterminal(),
                            };
                            return self.fail(error);
                        }
                        None => {
                            let error = AnalyzeError::MissingGoto {
                                state: exposed,
                                nonterminal: nonterminal(),
                            };
                            return self.fail(error);
                        }
                    };

                    self.record(StepAction::Reduce {
                        production: production_idx,
                        goto,
                    });
                    self.state_stack.truncate(keep);
                    self.symbol_stack.truncate(keep);
                    self.state_stack.push(goto);
                    self.symbol_stack.push(Symbol::Nonterminal(lhs));
                }
            }
        }
    }
}

/// Runs the shift-reduce machine over a whitespace-separated sentence. Errors
/// never escape; they end the trace and are reported in the result.
pub fn analyze(grammar: &Grammar, tables: &LRTables, sentence: &str) -> Analysis {
    let mut tokens: Vec<&str> = sentence.split_whitespace().collect();
    if tokens.is_empty() {
        return Analysis::failed(AnalyzeError::EmptyInput, Vec::new());
    }
    tokens.push(EOF_NAME);

    let machine = Machine {
        grammar,
        tables,
        tokens,
        cursor: 0,
        state_stack: vec![INITIAL_STATE],
        symbol_stack: vec![Symbol::EOF],
        steps: Vec::new(),
    };
    machine.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::collection::CanonicalCollection;

    fn tables_for(text: &str) -> (Grammar, LRTables) {
        let grammar: Grammar = text.parse().unwrap();
        let collection = CanonicalCollection::build(&grammar);
        let tables = LRTables::from_collection(&grammar, &collection);
        (grammar, tables)
    }

    const EXPRESSION: &str = "E -> E + T | T\nT -> id";

    #[test]
    fn test_accepts_sentence() {
        let (g, tables) = tables_for(EXPRESSION);
        let analysis = analyze(&g, &tables, "id + id");
        assert!(analysis.success, "{}", analysis.message);
        assert_eq!(analysis.error, None);

        let actions: Vec<String> = analysis.steps.iter().map(|s| s.action.to_text(&g)).collect();
        assert_eq!(actions.len(), 8);
        assert!(actions[0].starts_with("shift id, goto I"));
        assert!(actions[1].starts_with("reduce T -> id, goto I"));
        assert!(actions[2].starts_with("reduce E -> T, goto I"));
        assert!(actions[3].starts_with("shift +, goto I"));
        assert!(actions[4].starts_with("shift id, goto I"));
        assert!(actions[5].starts_with("reduce T -> id, goto I"));
        assert!(actions[6].starts_with("reduce E -> E + T, goto I"));
        assert_eq!(actions[7], "accept");
    }

    #[test]
    fn test_trace_shape() {
        let (g, tables) = tables_for(EXPRESSION);
        let analysis = analyze(&g, &tables, "id + id");
        let first = &analysis.steps[0];
        assert_eq!(first.step, 1);
        assert_eq!(first.state_stack, vec![INITIAL_STATE]);
        assert_eq!(first.symbol_stack, vec![Symbol::EOF]);
        assert_eq!(first.input, vec!["id", "+", "id", "$"]);

        let last = analysis.steps.last().unwrap();
        assert_eq!(last.action, StepAction::Accept);
        assert!(last.state_stack.len() > 1);
        assert_eq!(last.input, vec!["$"]);
        assert_eq!(last.symbol_stack, vec![Symbol::EOF, g.lookup("E").unwrap()]);

        for (i, step) in analysis.steps.iter().enumerate() {
            assert_eq!(step.step, i + 1);
            assert_eq!(step.state_stack.len(), step.symbol_stack.len());
        }
    }

    #[test]
    fn test_missing_eof_action() {
        let (g, tables) = tables_for(EXPRESSION);
        let analysis = analyze(&g, &tables, "id +");
        assert!(!analysis.success);
        let Some(AnalyzeError::NoAction { state, symbol }) = &analysis.error else {
            panic!("expected a missing action, got {:?}", analysis.error);
        };
        assert_eq!(symbol, "$");
        assert!(analysis.message.contains(&format!("I{}", state)));
        assert!(analysis.message.contains("`$`"));
        assert!(matches!(
            analysis.steps.last().map(|s| &s.action),
            Some(StepAction::Error(_))
        ));
    }

    #[test]
    fn test_input_after_typed_eof_is_rejected() {
        let (g, tables) = tables_for(EXPRESSION);
        let analysis = analyze(&g, &tables, "id $ id + id");
        assert!(!analysis.success);

        let collection = CanonicalCollection::build(&g);
        let after_e = collection
            .transition(&g, INITIAL_STATE, g.lookup("E").unwrap())
            .unwrap();
        assert_eq!(
            analysis.error,
            Some(AnalyzeError::TrailingInput {
                state: after_e,
                symbol: "id".to_string(),
            })
        );
        // shift id, reduce, reduce, error
        assert_eq!(analysis.steps.len(), 4);
        assert_eq!(analysis.steps[3].input, vec!["$", "id", "+", "id", "$"]);
        assert!(!analysis.steps.iter().any(|s| s.action == StepAction::Accept));
    }

    #[test]
    fn test_unknown_token() {
        let (g, tables) = tables_for(EXPRESSION);
        let analysis = analyze(&g, &tables, "id * id");
        assert_eq!(
            analysis.error,
            Some(AnalyzeError::NoAction {
                state: analysis.steps.last().unwrap().state_stack.last().copied().unwrap(),
                symbol: "*".to_string(),
            })
        );
    }

    #[test]
    fn test_nonterminal_token_is_rejected() {
        let (g, tables) = tables_for(EXPRESSION);
        let analysis = analyze(&g, &tables, "E");
        assert!(matches!(
            analysis.error,
            Some(AnalyzeError::NoAction { ref symbol, .. }) if symbol == "E"
        ));
        assert_eq!(analysis.steps.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let (g, tables) = tables_for(EXPRESSION);
        let analysis = analyze(&g, &tables, "   \n\t ");
        assert!(!analysis.success);
        assert_eq!(analysis.error, Some(AnalyzeError::EmptyInput));
        assert!(analysis.steps.is_empty());
    }

    #[test]
    fn test_conflict_aborts() {
        let (g, tables) = tables_for("S -> a S | ε");
        let analysis = analyze(&g, &tables, "a a");
        assert!(matches!(
            analysis.error,
            Some(AnalyzeError::AmbiguousAction { .. })
        ));
        assert_eq!(analysis.steps.len(), 1);
    }

    #[test]
    fn test_epsilon_reduce_without_conflict() {
        // `A -> ε` reduces without popping anything
        let (g, tables) = tables_for("S -> A x\nA -> ε");
        assert!(tables.is_lr0());
        let analysis = analyze(&g, &tables, "x");
        assert!(analysis.success, "{}", analysis.message);
        let first = analysis.steps[0].action.to_text(&g);
        assert!(first.starts_with("reduce A -> ε"));
        assert_eq!(analysis.steps[1].state_stack.len(), 2);
    }

    fn doctored_run(
        g: &Grammar,
        state_stack: Vec<StateIdx>,
        symbol_stack: Vec<Symbol>,
    ) -> Analysis {
        let collection = CanonicalCollection::build(g);
        let tables = LRTables::from_collection(g, &collection);
        let machine = Machine {
            grammar: g,
            tables: &tables,
            tokens: vec!["$"],
            cursor: 0,
            state_stack,
            symbol_stack,
            steps: Vec::new(),
        };
        machine.run()
    }

    #[test]
    fn test_underflow_reported() {
        let g: Grammar = EXPRESSION.parse().unwrap();
        let collection = CanonicalCollection::build(&g);
        let next = |from: StateIdx, name: &str| {
            collection.transition(&g, from, g.lookup(name).unwrap()).unwrap()
        };
        let complete_sum = next(next(next(INITIAL_STATE, "E"), "+"), "T");

        // `E -> E + T ·` on top of a stack that never saw `E +`
        let analysis = doctored_run(
            &g,
            vec![INITIAL_STATE, complete_sum],
            vec![Symbol::EOF, g.lookup("T").unwrap()],
        );
        assert_eq!(
            analysis.error,
            Some(AnalyzeError::StackUnderflow {
                rule: "E -> E + T".to_string(),
                depth: 1,
            })
        );
        assert_eq!(analysis.steps.len(), 1);
    }

    #[test]
    fn test_missing_goto_reported() {
        let g: Grammar = EXPRESSION.parse().unwrap();
        let collection = CanonicalCollection::build(&g);
        let next = |from: StateIdx, name: &str| {
            collection.transition(&g, from, g.lookup(name).unwrap()).unwrap()
        };
        let after_e = next(INITIAL_STATE, "E");
        let after_id = next(INITIAL_STATE, "id");

        // reducing `T -> id` exposes a state with no GOTO on T
        let analysis = doctored_run(
            &g,
            vec![INITIAL_STATE, after_e, after_id],
            vec![Symbol::EOF, g.lookup("E").unwrap(), g.lookup("id").unwrap()],
        );
        assert_eq!(
            analysis.error,
            Some(AnalyzeError::MissingGoto {
                state: after_e,
                nonterminal: "T".to_string(),
            })
        );
    }

    #[test]
    fn test_rerun_is_identical() {
        let (g, tables) = tables_for(EXPRESSION);
        assert_eq!(analyze(&g, &tables, "id + id + id"), analyze(&g, &tables, "id + id + id"));
    }
}
