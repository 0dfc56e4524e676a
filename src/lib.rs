pub mod bootstrap;
pub mod cli;
pub mod context;
pub mod error;
pub mod log;
pub mod manager;
pub mod services;
pub mod signals;

mod test_helpers;

pub use bootstrap::Bootstrap;
pub use context::{Cause, Context};
pub use error::*;
pub use manager::Manager;
pub use services::*;
