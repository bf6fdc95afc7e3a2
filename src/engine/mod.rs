//! I/O and concurrency machinery: request dispatch, the bounded worker
//! pool and suite orchestration.

pub mod executor;
pub mod host;
pub mod http;
pub mod json_path;
pub mod parallel;
pub mod suite;

pub use self::executor::{CaseExecutor, SingleTestExecutor};
pub use self::host::{collect_host_resources, HostResources};
pub use self::http::{HttpTransport, ReqwestTransport, TransportRequest, TransportResponse};
pub use self::parallel::ParallelTestRunner;
pub use self::suite::TestExecutor;
