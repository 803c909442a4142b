pub mod file_system;
pub mod transport;

pub use file_system::{FileSystem, FileSystemError, FileSystemResult};
pub use transport::{IncomingRequest, ResponseSink};
