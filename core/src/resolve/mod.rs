pub mod symbols;


pub use symbols::*;
