//! Label-scoped metric surfaces over a shared Prometheus registry.
//!
//! - [`registry`]: the shared registry and its owner-counted collectors
//! - [`table`]: per-surface collector ownership
//! - [`surface`]: [`MetricSurface`], the building block of every surface
//! - [`connection`], [`endpoint`], [`client`]: servers, clients and sockets
//! - [`eventbus`]: event-bus handlers and message flow
//! - [`pool`]: worker and connection pools
//! - [`facade`]: the factory the host framework talks to

pub mod client;
pub mod collector;
pub mod connection;
pub mod endpoint;
pub mod eventbus;
pub mod facade;
pub mod labels;
pub mod pool;
pub mod registry;
pub mod snapshot;
pub mod surface;
pub mod table;
pub mod timer;

pub use client::{HttpClientMetrics, SharedClientSurface, SharedClients};
pub use collector::{Collector, CollectorKind, CollectorSpec, RatioGauge};
pub use connection::{ConnectionMetrics, ConnectionSurface, RequestHandle, ResourceKind, address_name};
pub use endpoint::{EndpointHandle, EndpointState};
pub use eventbus::{EventBusSurface, HandlerHandle, ReplyFailure};
pub use facade::{DEFAULT_CLIENT, MetricsFacade};
pub use labels::{LabelComposer, LabelValues};
pub use pool::PoolSurface;
pub use registry::{MetricRegistry, RegistryDirectory};
pub use snapshot::{MetricSnapshot, Sample, SampleValue, Snapshot};
pub use surface::{BYTE_BUCKETS, MetricSurface, Surface};
pub use table::CollectorTable;
pub use timer::OpenTimer;
