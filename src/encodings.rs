//! # Encodings
//!
//! CNF encodings used by the weighted hitting set enumerator.

pub mod totalizer;
