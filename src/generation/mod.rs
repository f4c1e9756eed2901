pub mod inference;
pub mod orchestrator;
pub mod storage;

pub use inference::{HttpInferenceClient, InferenceClient};
pub use orchestrator::{GenerationError, GenerationOrchestrator, GenerationOutcome};
pub use storage::{build_public_url, HttpBucketStore, ObjectStore};
