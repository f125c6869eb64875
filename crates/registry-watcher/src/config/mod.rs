pub mod cli;
pub mod watch;

pub use cli::*;
pub use watch::*;
