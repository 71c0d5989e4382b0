//! Side-effecting operations: subprocess execution, the git working tree,
//! dev-server control, interactive sessions, and chapter configuration.

pub mod config;
pub mod process;
pub mod server;
pub mod session;
pub mod sourcetree;
