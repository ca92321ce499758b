pub mod ast;
pub mod config;
pub mod error;
