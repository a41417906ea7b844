pub mod job_state;
pub mod message;
pub mod task;

pub use job_state::{PersistedJobState, RetryMetadata};
pub use message::CallbackMessage;
pub use task::{CallbackTransport, Endpoint, Task};
