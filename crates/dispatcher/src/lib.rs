pub mod callback;
pub mod codec;
pub mod executor;
pub mod registry;

pub use callback::CallbackDispatcher;
pub use codec::JobDataCodec;
pub use executor::{CallbackJobExecutor, RetryPolicy};
pub use registry::TaskRegistry;
