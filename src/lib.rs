//! Self-validation engine for learned API integration capabilities.
//!
//! Test cases run against a live endpoint through an injected
//! [`HttpTransport`](engine::HttpTransport), bounded by a counting semaphore.
//! Results feed the statistical and results analyzers, which produce
//! confidence scores, benchmark grades and failure reports.

pub mod analysis;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod framework;

pub use analysis::{ResultsAnalyzer, StatisticalAnalyzer};
pub use config::EngineConfig;
pub use engine::{
    CaseExecutor, HttpTransport, ParallelTestRunner, ReqwestTransport, SingleTestExecutor,
    TestExecutor,
};
pub use error::{EngineError, Result, TransportError};
pub use framework::SelfTestingFramework;
