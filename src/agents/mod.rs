pub mod manifest_editor;
pub mod package_manager;
pub mod project_scanner;
pub mod snapshot_store;
pub mod trial_runner;
pub mod version_control;

// Snapshot-protected update pipeline
pub mod update;
