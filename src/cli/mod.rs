//! Command-line support: the JSON interchange model for one cell.
#![forbid(unsafe_code)]

/// Cell documents, tag text encoding and inspection summaries.
pub mod graph_json;
