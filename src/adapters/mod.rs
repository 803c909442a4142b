pub mod file_system;
pub mod http_handler;
pub mod middleware;
pub mod sink;

/// Re-export commonly used types from adapters
pub use file_system::{FileSystemAdapter, StaticFiles};
pub use http_handler::HttpHandler;
pub use middleware::*;
pub use sink::ChannelSink;
