//! Post-hoc computation over execution results.

pub mod results;
pub mod statistics;

pub use self::results::ResultsAnalyzer;
pub use self::statistics::StatisticalAnalyzer;
