// Update pipeline:
// - orchestrator: analysis, selection, snapshot-protected apply and rollback
// - interaction: prompts for interactive updates and rollbacks
// - reporter: progress output, injected so the pipeline runs headless in tests
// - pattern: glob filter over package names
pub mod interaction;
pub mod orchestrator;
pub mod pattern;
pub mod reporter;

pub use interaction::UpdateInteraction;
pub use orchestrator::{UpdateCandidate, UpdateFilter, UpdateOrchestrator};
pub use pattern::PatternMatcher;
pub use reporter::{ConsoleReporter, Reporter};
