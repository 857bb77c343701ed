pub mod analyzer;
pub mod diag;

pub use analyzer::Analyzer;
pub use diag::Diagnostic;
pub use tarn_frontend::types::{FunctionType, StructType, Type};
