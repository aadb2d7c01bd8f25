pub mod file_store;
pub mod path_validator;
pub mod project_lock;

pub use file_store::{FileStore, FsFileStore};
pub use path_validator::PathValidator;
pub use project_lock::ProjectLock;
