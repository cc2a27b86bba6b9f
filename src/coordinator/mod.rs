pub mod coordinator;
pub mod mode;

pub use coordinator::{CoordinatorStats, ModeControl, ModeCoordinator, TransitionRecord};
pub use mode::{Mode, ModeCell};
