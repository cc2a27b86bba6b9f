pub mod definition;
pub mod executor;
pub mod pipeline;
pub mod request;
pub mod sanitize;
pub mod validator;
pub mod window;

pub use definition::{TriggerDefinition, TriggerRegistry};
pub use executor::{ActionOutcome, ModeRequest, TriggerAction, TriggerExecutor};
pub use pipeline::{PipelineStats, TriggerPipeline};
pub use request::{LatestSlot, SequenceCounter, ValidationRequest};
pub use sanitize::sanitize_transcript;
pub use validator::{ValidationOutcome, ValidationPool};
pub use window::ContextWindow;
