//! Pure, deterministic chapter logic: the listing model, the book-text
//! parser, and output reconciliation. No I/O lives here.

pub mod listing;
pub mod parser;
pub mod reconcile;
