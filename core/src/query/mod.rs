mod complete;
mod locate;
pub mod symbols;


pub use symbols::*;
