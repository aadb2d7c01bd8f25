pub mod registry;
pub mod version;

pub use registry::NpmRegistry;
pub use version::{RiskLevel, UpdateType, VersionComparator};
