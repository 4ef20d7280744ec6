//! Job output retrieval and parsing of scoring results.

mod download;
mod parse;

pub use download::{read_predictions, NAMED_OUTPUTS_DIR};
pub use parse::{parse_predictions, PredictionRow, PredictionTable, Scalar};
