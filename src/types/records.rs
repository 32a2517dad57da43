//! The canonical record schema.
//!
//! Rules normalize whatever a source returns into this closed set of
//! variants. Records are immutable once produced; the recorder merges them
//! per task into the final export shape. `container_key` is the canonical
//! identity of a container within a task; `container_no` is the raw value as
//! displayed by the source.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::types::task::{SearchType, TaskId};

/// Result status taxonomy, in ascending severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    /// Informational, not a failure.
    Ok,
    /// A normal extracted business record.
    Data,
    /// Diagnostic output, never exported.
    Debug,
    /// The search number is invalid or unknown to the source. Terminal for
    /// the task, not the batch.
    Error,
    /// Unrecoverable for the task: anti-bot block, broken transport, or a
    /// misconfigured source.
    Fatal,
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::Data => "DATA",
            Self::Debug => "DEBUG",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        };
        write!(f, "{s}")
    }
}

/// A port, terminal, or depot reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// UN/LOCODE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub un_lo_code: Option<String>,
    /// US customs FIRMS code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firms_code: Option<String>,
}

impl Location {
    /// Location known only by display name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Whether a status event is an estimate or has actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTiming {
    /// Actual, confirmed by the source.
    #[serde(rename = "A")]
    Actual,
    /// Estimated.
    #[serde(rename = "E")]
    Estimated,
}

fn merge_opt<T>(dst: &mut Option<T>, src: Option<T>) {
    if src.is_some() {
        *dst = src;
    }
}

/// Shipment-level summary for one task. Fields fill in across responses;
/// later values win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentSummary {
    /// Owning task.
    pub task_id: TaskId,
    /// Current vessel name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vessel: Option<String>,
    /// Current voyage code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voyage: Option<String>,
    /// Place of receipt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub por: Option<Location>,
    /// Port of loading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pol: Option<Location>,
    /// Port of discharge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod: Option<Location>,
    /// Place of delivery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_of_delivery: Option<Location>,
    /// Final destination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_dest: Option<Location>,
    /// Estimated departure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etd: Option<NaiveDate>,
    /// Actual departure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atd: Option<NaiveDate>,
    /// Estimated arrival.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<NaiveDate>,
    /// Actual arrival.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ata: Option<NaiveDate>,
    /// Number of containers under this shipment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_quantity: Option<u32>,
    /// When the source last refreshed this data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_update: Option<NaiveDateTime>,
}

impl ShipmentSummary {
    /// Empty summary for a task.
    pub fn new(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            vessel: None,
            voyage: None,
            por: None,
            pol: None,
            pod: None,
            place_of_delivery: None,
            final_dest: None,
            etd: None,
            atd: None,
            eta: None,
            ata: None,
            container_quantity: None,
            latest_update: None,
        }
    }

    /// Fold another partial summary into this one. Fields present in `other`
    /// replace ours.
    pub fn merge(&mut self, other: ShipmentSummary) {
        merge_opt(&mut self.vessel, other.vessel);
        merge_opt(&mut self.voyage, other.voyage);
        merge_opt(&mut self.por, other.por);
        merge_opt(&mut self.pol, other.pol);
        merge_opt(&mut self.pod, other.pod);
        merge_opt(&mut self.place_of_delivery, other.place_of_delivery);
        merge_opt(&mut self.final_dest, other.final_dest);
        merge_opt(&mut self.etd, other.etd);
        merge_opt(&mut self.atd, other.atd);
        merge_opt(&mut self.eta, other.eta);
        merge_opt(&mut self.ata, other.ata);
        merge_opt(&mut self.container_quantity, other.container_quantity);
        merge_opt(&mut self.latest_update, other.latest_update);
    }
}

/// Per-container summary fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Owning task.
    pub task_id: TaskId,
    /// Canonical container identity within the task.
    pub container_key: String,
    /// Raw container number as displayed by the source.
    pub container_no: String,
    /// Last free day at the import terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_free_day: Option<NaiveDate>,
    /// Empty container picked up by the shipper.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_pickup_date: Option<NaiveDate>,
    /// Empty container returned after unpacking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_return_date: Option<NaiveDate>,
    /// Full container gated in at origin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_pickup_date: Option<NaiveDate>,
    /// Full container delivered at destination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_return_date: Option<NaiveDate>,
    /// Where the empty was or will be returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mt_location: Option<Location>,
    /// Source says the container can be picked up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_for_pickup: Option<bool>,
}

impl ContainerSummary {
    /// Empty summary for a container. `container_no` defaults to the key
    /// until a rule supplies the display value.
    pub fn new(task_id: impl Into<TaskId>, container_key: impl Into<String>) -> Self {
        let container_key = container_key.into();
        Self {
            task_id: task_id.into(),
            container_no: container_key.clone(),
            container_key,
            last_free_day: None,
            empty_pickup_date: None,
            empty_return_date: None,
            full_pickup_date: None,
            full_return_date: None,
            mt_location: None,
            ready_for_pickup: None,
        }
    }

    /// Fold another partial summary for the same container into this one.
    pub fn merge(&mut self, other: ContainerSummary) {
        self.container_no = other.container_no;
        merge_opt(&mut self.last_free_day, other.last_free_day);
        merge_opt(&mut self.empty_pickup_date, other.empty_pickup_date);
        merge_opt(&mut self.empty_return_date, other.empty_return_date);
        merge_opt(&mut self.full_pickup_date, other.full_pickup_date);
        merge_opt(&mut self.full_return_date, other.full_return_date);
        merge_opt(&mut self.mt_location, other.mt_location);
        merge_opt(&mut self.ready_for_pickup, other.ready_for_pickup);
    }
}

/// One milestone in a container's movement history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatusEvent {
    /// Owning task.
    pub task_id: TaskId,
    /// Canonical container identity within the task.
    pub container_key: String,
    /// Source's description of the milestone.
    pub description: String,
    /// Where it happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Source-local timestamp of the milestone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_date_time: Option<NaiveDateTime>,
    /// Mode of transport (vessel, truck, rail).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Vessel involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vessel: Option<String>,
    /// Voyage involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voyage: Option<String>,
    /// Estimate or actual.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_or_actual: Option<EventTiming>,
}

impl ContainerStatusEvent {
    /// Create a status event.
    pub fn new(
        task_id: impl Into<TaskId>,
        container_key: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            container_key: container_key.into(),
            description: description.into(),
            location: None,
            local_date_time: None,
            transport: None,
            vessel: None,
            voyage: None,
            est_or_actual: None,
        }
    }
}

/// One ocean leg of the shipment's routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselLeg {
    /// Owning task.
    pub task_id: TaskId,
    /// Canonical vessel identity within the task.
    pub vessel_key: String,
    /// Vessel name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vessel: Option<String>,
    /// Voyage code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voyage: Option<String>,
    /// Port of loading for this leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pol: Option<Location>,
    /// Port of discharge for this leg.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod: Option<Location>,
    /// Estimated departure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etd: Option<NaiveDate>,
    /// Estimated arrival.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<NaiveDate>,
    /// Actual departure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atd: Option<NaiveDate>,
    /// Actual arrival.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ata: Option<NaiveDate>,
    /// Position of this leg in the routing, starting at 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_no: Option<u32>,
}

impl VesselLeg {
    /// Empty leg for a vessel key.
    pub fn new(task_id: impl Into<TaskId>, vessel_key: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            vessel_key: vessel_key.into(),
            vessel: None,
            voyage: None,
            pol: None,
            pod: None,
            etd: None,
            eta: None,
            atd: None,
            ata: None,
            sequence_no: None,
        }
    }

    /// Fold another partial leg for the same vessel key into this one.
    pub fn merge(&mut self, other: VesselLeg) {
        merge_opt(&mut self.vessel, other.vessel);
        merge_opt(&mut self.voyage, other.voyage);
        merge_opt(&mut self.pol, other.pol);
        merge_opt(&mut self.pod, other.pod);
        merge_opt(&mut self.etd, other.etd);
        merge_opt(&mut self.eta, other.eta);
        merge_opt(&mut self.atd, other.atd);
        merge_opt(&mut self.ata, other.ata);
        merge_opt(&mut self.sequence_no, other.sequence_no);
    }
}

/// The source has no data for the task's search number. Terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotFoundMarker {
    /// Owning task.
    pub task_id: TaskId,
    /// The number that was searched.
    pub search_no: String,
    /// What kind of number it was.
    pub search_type: SearchType,
    /// Optional source wording.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A classified fault. Terminal for the owning task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMarker {
    /// Owning task.
    pub task_id: TaskId,
    /// Classified severity.
    pub status: ResultStatus,
    /// Tagged human-readable detail.
    pub detail: String,
}

/// Declares how many task completions the batch still expects.
///
/// Pending-request counting cannot express "no more tasks will ever arrive",
/// so batch-style rules emit this once they know the task population. See
/// [`CompletionTracker`](crate::engine::CompletionTracker) for the countdown
/// state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEndMarker {
    /// Number of task completions still expected.
    pub remaining: usize,
}

/// Canonical record variants. Closed set; rules produce nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackingRecord {
    /// Shipment-level summary fields.
    ShipmentSummary(ShipmentSummary),
    /// Container-level summary fields.
    ContainerSummary(ContainerSummary),
    /// One container movement milestone.
    ContainerStatusEvent(ContainerStatusEvent),
    /// One leg of the ocean routing.
    VesselLeg(VesselLeg),
    /// Search number unknown to the source.
    NotFound(NotFoundMarker),
    /// Classified fault.
    Error(ErrorMarker),
    /// Batch countdown declaration.
    TaskEnd(TaskEndMarker),
}

impl TrackingRecord {
    /// The task this record belongs to. `TaskEnd` is batch-scoped and owns
    /// no task.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::ShipmentSummary(r) => Some(&r.task_id),
            Self::ContainerSummary(r) => Some(&r.task_id),
            Self::ContainerStatusEvent(r) => Some(&r.task_id),
            Self::VesselLeg(r) => Some(&r.task_id),
            Self::NotFound(r) => Some(&r.task_id),
            Self::Error(r) => Some(&r.task_id),
            Self::TaskEnd(_) => None,
        }
    }

    /// Whether this record ends its task's search.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ShipmentSummary(_) | Self::NotFound(_) | Self::Error(_)
        )
    }
}

impl From<ShipmentSummary> for TrackingRecord {
    fn from(r: ShipmentSummary) -> Self {
        Self::ShipmentSummary(r)
    }
}

impl From<ContainerSummary> for TrackingRecord {
    fn from(r: ContainerSummary) -> Self {
        Self::ContainerSummary(r)
    }
}

impl From<ContainerStatusEvent> for TrackingRecord {
    fn from(r: ContainerStatusEvent) -> Self {
        Self::ContainerStatusEvent(r)
    }
}

impl From<VesselLeg> for TrackingRecord {
    fn from(r: VesselLeg) -> Self {
        Self::VesselLeg(r)
    }
}

impl From<NotFoundMarker> for TrackingRecord {
    fn from(r: NotFoundMarker) -> Self {
        Self::NotFound(r)
    }
}

impl From<ErrorMarker> for TrackingRecord {
    fn from(r: ErrorMarker) -> Self {
        Self::Error(r)
    }
}

impl From<TaskEndMarker> for TrackingRecord {
    fn from(r: TaskEndMarker) -> Self {
        Self::TaskEnd(r)
    }
}
