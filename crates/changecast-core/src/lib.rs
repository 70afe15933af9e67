//! changecast core library.
//!
//! This crate routes committed change events to the groups that should hear
//! about them. The router is transport-agnostic: anything implementing
//! [`GroupTransport`] can carry the broadcasts, including the in-process
//! [`InMemoryChannelLayer`].
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use changecast_core::{cdc, BroadcastRouter, InMemoryChannelLayer};
//!
//! let layer = Arc::new(InMemoryChannelLayer::new());
//! let router = Arc::new(BroadcastRouter::new(layer.clone()));
//!
//! // Persistence layer: submit each committed change.
//! let handle = cdc::start_processor(router, cdc::DEFAULT_BUFFER_SIZE);
//! handle.notify_committed(&change, &JsonSerializer).await?;
//! ```

pub mod cdc;
pub mod error;
pub mod layer;
pub mod metrics;
pub mod router;
pub mod serializer;
pub mod transport;

pub use cdc::{start_processor, ChangeHandle, ChangeProcessor};
pub use error::Error;
pub use layer::{InMemoryChannelLayer, LayerConfig, SharedChannelLayer};
pub use metrics::RouterMetrics;
pub use router::{AudiencePolicy, BroadcastRouter, Dispatch, RouterConfig, SharedRouter};
pub use serializer::{build_event, ChangeRecord, ChangeSerializer, JsonSerializer};
pub use transport::GroupTransport;
