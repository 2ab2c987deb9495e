use std::{fs, io, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use lr0::{
    parser::{driver::Analysis, table::ConflictKind},
    Lr0Parser,
};
use petgraph::dot::Dot;
use serde::Serialize;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{fmt, layer::SubscriberExt, registry, util::SubscriberInitExt, Layer};

/// Builds the LR(0) automaton of a grammar and traces the parse of a sentence.
#[derive(Parser)]
#[command(name = "automaton")]
struct Args {
    /// Grammar file, one `LHS -> alt | alt` family per line
    grammar: PathBuf,

    /// Whitespace-separated sentence to analyze
    #[arg(short, long, conflicts_with = "sentence_file")]
    sentence: Option<String>,

    /// Read the sentence from a file instead
    #[arg(long)]
    sentence_file: Option<PathBuf>,

    /// Print the canonical collection
    #[arg(long)]
    items: bool,

    /// Print the ACTION/GOTO table
    #[arg(long)]
    table: bool,

    /// Print the parse trace
    #[arg(long)]
    trace: bool,

    /// Print the automaton in graphviz format
    #[arg(long)]
    dot: bool,

    /// Print everything as one JSON document
    #[arg(long)]
    json: bool,

    /// More logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct StateReport {
    state: usize,
    items: Vec<String>,
}

#[derive(Serialize)]
struct TraceRow {
    step: usize,
    states: String,
    symbols: String,
    input: String,
    action: String,
}

#[derive(Serialize)]
struct Report<'a> {
    productions: Vec<String>,
    item_sets: Vec<StateReport>,
    conflicts: Vec<String>,
    trace: Vec<TraceRow>,
    analysis: Option<&'a Analysis>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let layer = fmt::layer()
        .without_time()
        .with_writer(io::stderr)
        .with_filter(level);
    registry().with(layer).init();
}

fn trace_rows(parser: &Lr0Parser, analysis: &Analysis) -> Vec<TraceRow> {
    let grammar = parser.grammar();
    analysis
        .steps
        .iter()
        .map(|step| TraceRow {
            step: step.step,
            states: step
                .state_stack
                .iter()
                .map(|s| format!("I{}", s))
                .collect::<Vec<_>>()
                .join(" "),
            symbols: step
                .symbol_stack
                .iter()
                .map(|s| grammar.symbol_name(*s))
                .collect::<Vec<_>>()
                .join(" "),
            input: step.input.join(" "),
            action: parser.describe_step(step),
        })
        .collect()
}

fn conflict_lines(parser: &Lr0Parser) -> Vec<String> {
    let Some(tables) = parser.tables() else {
        return Vec::new();
    };
    tables
        .conflicts()
        .into_iter()
        .map(|c| {
            let kind = match c.kind {
                ConflictKind::ShiftReduce => "shift/reduce",
                ConflictKind::AcceptReduce => "accept/reduce",
                ConflictKind::ReduceReduce => "reduce/reduce",
                ConflictKind::Goto => "goto",
            };
            let symbol = parser.grammar().symbol_name(c.symbol);
            format!("{} conflict in I{} on {}", kind, c.state, symbol)
        })
        .collect()
}

fn print_items(parser: &Lr0Parser) {
    for (i, set) in parser.item_sets().iter().enumerate() {
        println!("I{}:", i);
        for line in parser.item_set_to_text(set).lines() {
            println!("    {}", line);
        }
        println!();
    }
}

fn print_trace(rows: &[TraceRow]) {
    let header = ["Step", "States", "Symbols", "Input", "Action"];
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|r| {
            [
                r.step.to_string(),
                r.states.clone(),
                r.symbols.clone(),
                r.input.clone(),
                r.action.clone(),
            ]
        })
        .collect();
    let widths: Vec<usize> = (0..header.len())
        .map(|c| {
            cells
                .iter()
                .map(|r| r[c].chars().count())
                .chain(std::iter::once(header[c].len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let print_row = |row: &[&str]| {
        let padded: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        println!("{}", padded.join(" | ").trim_end());
    };
    print_row(&header[..]);
    for row in &cells {
        let row: Vec<&str> = row.iter().map(String::as_str).collect();
        print_row(&row[..]);
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let grammar_text = fs::read_to_string(&args.grammar)
        .with_context(|| format!("failed to read grammar file {}", args.grammar.display()))?;
    let sentence = match (&args.sentence, &args.sentence_file) {
        (Some(s), _) => Some(s.clone()),
        (None, Some(path)) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read sentence file {}", path.display()))?,
        ),
        (None, None) => None,
    };

    let mut parser = Lr0Parser::build(&grammar_text).context("invalid grammar")?;
    parser.construct_item_sets();
    parser.construct_table();
    info!("{} states", parser.item_sets().len());

    let analysis = sentence.as_deref().map(|s| parser.analyze(s));
    let rows = analysis
        .as_ref()
        .map(|a| trace_rows(&parser, a))
        .unwrap_or_default();

    if args.json {
        let report = Report {
            productions: (0..parser.grammar().productions().len())
                .map(|i| parser.production_to_text(lr0::parser::grammar::ProductionIdx::new(i)))
                .collect(),
            item_sets: parser
                .item_sets()
                .iter()
                .enumerate()
                .map(|(state, set)| StateReport {
                    state,
                    items: parser.item_set_to_text(set).lines().map(str::to_string).collect(),
                })
                .collect(),
            conflicts: conflict_lines(&parser),
            trace: rows,
            analysis: analysis.as_ref(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let any_selected = args.items || args.table || args.trace || args.dot;
        if args.items || !any_selected {
            print_items(&parser);
        }
        if args.table || !any_selected {
            if let Some(table) = parser.table_to_text() {
                print!("{}", table);
            }
            for line in conflict_lines(&parser) {
                println!("{}", line);
            }
            println!();
        }
        if args.dot {
            println!("{:?}", Dot::new(&parser.automaton_graph()));
        }
        if let Some(analysis) = &analysis {
            if args.trace || !any_selected {
                print_trace(&rows);
            }
            println!("{}", analysis.message);
        }
    }

    match analysis {
        Some(a) if !a.success => Ok(ExitCode::FAILURE),
        _ => Ok(ExitCode::SUCCESS),
    }
}
