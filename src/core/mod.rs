pub mod orchestrator;
pub mod progress;
pub mod session;
pub mod state;
pub mod store;

pub use orchestrator::Orchestrator;
pub use progress::{ProgressConfig, ProgressReporter, ProgressSnapshot};
pub use session::{FileSessionStorage, MemorySessionStorage, SessionStorage, LATEST_TRIP_KEY};
pub use state::{GenerationOutcome, GenerationPath, GenerationState};
pub use store::TripStore;
