//! OS process plumbing for the engine subprocess.

mod pidfile;
mod shutdown;

pub use pidfile::{delete_pidfile, kill_stale_engine, write_pidfile};
pub use shutdown::terminate_child;
