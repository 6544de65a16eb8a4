pub mod cancel;
pub mod coordinator;

pub use cancel::CancellationToken;
pub use coordinator::{InFlightRequest, PipelineEvent, RequestCoordinator, UpdateMeta};
