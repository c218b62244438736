//! Session orchestration: event decoding, the relay loops and the registry.

mod coordinator;
mod events;
mod registry;

pub use coordinator::{
    DEFAULT_CLIENT_IDLE_BACKOFF, DEFAULT_CLIENT_POLL_TIMEOUT, LoopExit, RelayCoordinator,
    RelaySettings, SessionOutcome,
};
pub use events::{ErrorDetail, UpstreamEvent, connect_error_message};
pub use registry::{
    RegistryError, SessionRegistration, SessionRegistry, SharedTracker, generate_session_id,
};
