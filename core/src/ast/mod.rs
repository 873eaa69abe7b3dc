pub mod nodes;
pub mod parser;
pub mod printer;

#[cfg(test)]
mod ast_test;

pub use nodes::*;
pub use parser::*;
pub use printer::*;
