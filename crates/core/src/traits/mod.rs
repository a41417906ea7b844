pub mod callback;
pub mod queue_publisher;
pub mod trigger_store;

pub use callback::CallbackDispatch;
pub use queue_publisher::QueuePublisher;
pub use trigger_store::{
    FireContext, FireDisposition, JobData, JobHandler, JobKey, JobSpec, StoredJob, TriggerSpec,
    TriggerStore,
};
