pub mod actor;
pub mod backoff;
pub mod events;

pub use actor::{spawn_actor, ActorHandle};
pub use backoff::BackoffStrategy;
pub use events::ProcessEvent;
