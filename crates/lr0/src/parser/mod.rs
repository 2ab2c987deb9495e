pub mod collection;
pub mod driver;
pub mod grammar;
pub mod graph;
pub mod item;
pub mod table;

use petgraph::Graph;

use collection::CanonicalCollection;
use driver::{Analysis, AnalyzeError, ParseStep};
use grammar::{Grammar, GrammarError, ProductionIdx};
use item::ItemSet;
use table::LRTables;

/// Owns one grammar together with its automaton and tables. Each construction
/// call replaces what the previous one built.
#[derive(Debug, Clone)]
pub struct Lr0Parser {
    grammar: Grammar,
    collection: CanonicalCollection,
    tables: Option<LRTables>,
}

impl Lr0Parser {
    pub fn build(grammar_text: &str) -> Result<Lr0Parser, GrammarError> {
        let grammar: Grammar = grammar_text.parse()?;
        Ok(Lr0Parser {
            grammar,
            collection: CanonicalCollection::default(),
            tables: None,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn construct_item_sets(&mut self) -> &[ItemSet] {
        self.collection = CanonicalCollection::build(&self.grammar);
        // tables built from an older collection are stale
        self.tables = None;
        self.collection.states()
    }

    /// Builds the item sets first if they have not been built yet.
    pub fn construct_table(&mut self) -> &LRTables {
        if self.collection.is_empty() {
            self.construct_item_sets();
        }
        let tables = LRTables::from_collection(&self.grammar, &self.collection);
        self.tables.insert(tables)
    }

    pub fn item_sets(&self) -> &[ItemSet] {
        self.collection.states()
    }

    pub fn tables(&self) -> Option<&LRTables> {
        self.tables.as_ref()
    }

    /// Fails with `TablesNotConstructed` unless `construct_table` ran.
    pub fn analyze(&self, sentence: &str) -> Analysis {
        match &self.tables {
            Some(tables) => driver::analyze(&self.grammar, tables, sentence),
            None => Analysis::failed(AnalyzeError::TablesNotConstructed, Vec::new()),
        }
    }

    pub fn item_set_to_text(&self, set: &ItemSet) -> String {
        set.to_text(&self.grammar)
    }

    pub fn production_to_text(&self, index: ProductionIdx) -> String {
        self.grammar.production_to_text(index)
    }

    pub fn describe_step(&self, step: &ParseStep) -> String {
        step.action.to_text(&self.grammar)
    }

    pub fn table_to_text(&self) -> Option<String> {
        self.tables.as_ref().map(|t| t.to_text(&self.grammar))
    }

    pub fn automaton_graph(&self) -> Graph<String, String> {
        graph::automaton_graph(&self.grammar, &self.collection)
    }
}
