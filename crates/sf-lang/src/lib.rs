pub mod analysis;
pub mod ast;
pub mod formula_parser;
pub mod parse_utils;
pub mod plan;

pub use analysis::{AnalysisError, FormulaAnalysis, analyze};
pub use formula_parser::{FormulaParseError, parse_formula};
pub use plan::{BindingPlan, StrategyTag};
