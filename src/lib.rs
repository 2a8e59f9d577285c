pub mod arena;
pub mod ast;
pub mod builtins;
pub mod config;
pub mod interpreter;
pub mod ledger;
pub mod parser;
pub mod span;
pub mod tokenizer;
