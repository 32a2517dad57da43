//! Core data types: tasks, request descriptors, responses, and the canonical
//! record schema every rule produces.

pub mod records;
pub mod request;
pub mod response;
pub mod task;

pub use records::{
    ContainerStatusEvent, ContainerSummary, ErrorMarker, EventTiming, Location, NotFoundMarker,
    ResultStatus, ShipmentSummary, TaskEndMarker, TrackingRecord, VesselLeg,
};
pub use request::{RequestContext, RequestDescriptor, RequestPayload, RequestQueue};
pub use response::FetchResponse;
pub use task::{dedup_batch, SearchType, TaskDescriptor, TaskId};
