pub mod cli;
pub mod context;
pub mod error;
pub mod execution;
pub mod extract;
pub mod logging;
pub mod task;
pub mod upload;
pub mod util;

pub use context::{Context, Platform};
pub use error::{RelmanError, Result};
pub use execution::TaskRunner;
