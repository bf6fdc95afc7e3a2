mod analysis_types;
mod results;
mod types;

pub use analysis_types::*;
pub use results::*;
pub use types::*;
