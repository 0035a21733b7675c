//! Query language subset
//!
//! - `lexer`: tokenization
//! - `parser`: syntax tree
//! - `plan`: bind variable resolution and lazy execution
//! - `value`: value ordering shared by FILTER and SORT
//! - `normalize`: result normalization helpers for assertions

pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod plan;
pub mod value;

pub use normalize::{normalize_row, normalize_rows};
pub use parser::Query;
pub use plan::{BoundQuery, Rows};
