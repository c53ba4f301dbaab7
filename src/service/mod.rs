pub mod daemon;
pub mod signals;

pub use daemon::{ServiceInstaller, ServiceManager};
pub use signals::SignalType;
