pub mod parser;

pub use parser::Lr0Parser;
