pub mod ast;
pub mod context;
pub mod diag;
pub mod query;
pub mod resolve;
pub mod script;
pub mod token;
pub mod types;
pub mod util;
