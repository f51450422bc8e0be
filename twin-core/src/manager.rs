//! Device identity and status.
//!
//! The identity fields are plain values replaced whenever a caller supplies
//! a different one. Status follows a small transition rule:
//!
//! ```text
//! requested      current        reason    result
//! unspecified    anything       any       cleared (status, reason, time)
//! S              S              any       unchanged
//! S              not S          None      MissingReasonOnStatusChange
//! S              not S          Some(r)   status = S, reason = r, time = now
//! ```

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use twin_types::{ConnectionState, DeviceStatus, PropertyTree, TwinError, TwinValue};

use crate::clock::format_timestamp;

const DEVICE_ID: &str = "deviceId";
const GENERATION_ID: &str = "generationId";
const ETAG: &str = "etag";
const STATUS: &str = "status";
const STATUS_REASON: &str = "statusReason";
const STATUS_UPDATED_TIME: &str = "statusUpdatedTime";
const CONNECTION_STATE: &str = "connectionState";
const CONNECTION_STATE_UPDATED_TIME: &str = "connectionStateUpdatedTime";
const LAST_ACTIVITY_TIME: &str = "lastActivityTime";

/// A programmatic identity/status update.
///
/// `None` identity fields leave the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceUpdate {
    /// New device id.
    pub device_id: Option<String>,
    /// New generation id.
    pub generation_id: Option<String>,
    /// New weak entity tag.
    pub etag: Option<String>,
    /// Requested status.
    pub status: DeviceStatus,
    /// Reason for a status change.
    pub status_reason: Option<String>,
}

impl DeviceUpdate {
    /// An update that only requests a status.
    pub fn status(status: DeviceStatus, reason: Option<&str>) -> Self {
        Self {
            status,
            status_reason: reason.map(str::to_string),
            ..Self::default()
        }
    }
}

/// Identity and status fields as read from a twin document.
///
/// Every field is optional; only present ones overwrite the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    /// `deviceId`
    pub device_id: Option<String>,
    /// `generationId`
    pub generation_id: Option<String>,
    /// `etag`
    pub etag: Option<String>,
    /// `status`
    pub status: Option<DeviceStatus>,
    /// `statusReason`
    pub status_reason: Option<String>,
    /// `statusUpdatedTime`
    pub status_updated_time: Option<String>,
    /// `connectionState`
    pub connection_state: Option<ConnectionState>,
    /// `connectionStateUpdatedTime`
    pub connection_state_updated_time: Option<String>,
    /// `lastActivityTime`
    pub last_activity_time: Option<String>,
}

impl DeviceRecord {
    /// Read the record fields from the top level of a document.
    ///
    /// # Errors
    ///
    /// [`TwinError::MalformedDocument`] when a field is not a string or an
    /// enum field holds an unknown name.
    pub fn decode(doc: &PropertyTree) -> Result<Self, TwinError> {
        let status = string_field(doc, STATUS)?
            .map(|s| s.parse::<DeviceStatus>())
            .transpose()?;
        let connection_state = string_field(doc, CONNECTION_STATE)?
            .map(|s| s.parse::<ConnectionState>())
            .transpose()?;

        Ok(Self {
            device_id: string_field(doc, DEVICE_ID)?,
            generation_id: string_field(doc, GENERATION_ID)?,
            etag: string_field(doc, ETAG)?,
            status,
            status_reason: string_field(doc, STATUS_REASON)?,
            status_updated_time: string_field(doc, STATUS_UPDATED_TIME)?,
            connection_state,
            connection_state_updated_time: string_field(doc, CONNECTION_STATE_UPDATED_TIME)?,
            last_activity_time: string_field(doc, LAST_ACTIVITY_TIME)?,
        })
    }
}

fn string_field(doc: &PropertyTree, key: &str) -> Result<Option<String>, TwinError> {
    match doc.get(key) {
        None | Some(TwinValue::Null) => Ok(None),
        Some(TwinValue::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(TwinError::MalformedDocument(format!(
            "{key} must be a string, found {}",
            other.type_name()
        ))),
    }
}

/// Flat identity/status record of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceManager {
    device_id: Option<String>,
    generation_id: Option<String>,
    etag: Option<String>,
    status: DeviceStatus,
    status_reason: Option<String>,
    status_updated_time: Option<String>,
    connection_state: ConnectionState,
    connection_state_updated_time: Option<String>,
    last_activity_time: Option<String>,
}

impl DeviceManager {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an identity/status update at time `now`.
    ///
    /// Returns whether anything changed. On error nothing is modified.
    ///
    /// # Errors
    ///
    /// [`TwinError::MissingReasonOnStatusChange`] when the status would
    /// change and no reason was given.
    pub fn update(&mut self, update: DeviceUpdate, now: DateTime<Utc>) -> Result<bool, TwinError> {
        let status_changes = update.status.is_specified() && update.status != self.status;
        if status_changes && update.status_reason.is_none() {
            return Err(TwinError::MissingReasonOnStatusChange);
        }

        let mut changed = false;

        if !update.status.is_specified() {
            changed |= self.status.is_specified();
            self.status = DeviceStatus::Unspecified;
            self.status_reason = None;
            self.status_updated_time = None;
        } else if status_changes {
            tracing::debug!(from = %self.status, to = %update.status, "device status changed");
            self.status = update.status;
            self.status_reason = update.status_reason;
            self.status_updated_time = Some(format_timestamp(now));
            changed = true;
        }

        changed |= replace_if_different(&mut self.device_id, update.device_id);
        changed |= replace_if_different(&mut self.generation_id, update.generation_id);
        changed |= replace_if_different(&mut self.etag, update.etag);

        Ok(changed)
    }

    /// Overwrite every field present in `record`.
    pub fn absorb(&mut self, record: DeviceRecord) {
        let DeviceRecord {
            device_id,
            generation_id,
            etag,
            status,
            status_reason,
            status_updated_time,
            connection_state,
            connection_state_updated_time,
            last_activity_time,
        } = record;

        overwrite(&mut self.device_id, device_id);
        overwrite(&mut self.generation_id, generation_id);
        overwrite(&mut self.etag, etag);
        if let Some(status) = status {
            self.status = status;
        }
        overwrite(&mut self.status_reason, status_reason);
        overwrite(&mut self.status_updated_time, status_updated_time);
        if let Some(state) = connection_state {
            self.connection_state = state;
        }
        overwrite(
            &mut self.connection_state_updated_time,
            connection_state_updated_time,
        );
        overwrite(&mut self.last_activity_time, last_activity_time);
    }

    /// Encode the fields that are set, in wire order.
    pub fn encode(&self) -> Map<String, Value> {
        let mut map = Map::new();
        put(&mut map, DEVICE_ID, self.device_id.as_deref());
        put(&mut map, GENERATION_ID, self.generation_id.as_deref());
        put(&mut map, ETAG, self.etag.as_deref());
        if self.status.is_specified() {
            put(&mut map, STATUS, Some(self.status.as_str()));
        }
        put(&mut map, STATUS_REASON, self.status_reason.as_deref());
        put(&mut map, STATUS_UPDATED_TIME, self.status_updated_time.as_deref());
        if self.connection_state.is_specified() {
            put(&mut map, CONNECTION_STATE, Some(self.connection_state.as_str()));
        }
        put(
            &mut map,
            CONNECTION_STATE_UPDATED_TIME,
            self.connection_state_updated_time.as_deref(),
        );
        put(&mut map, LAST_ACTIVITY_TIME, self.last_activity_time.as_deref());
        map
    }

    /// Device id.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Generation id.
    pub fn generation_id(&self) -> Option<&str> {
        self.generation_id.as_deref()
    }

    /// Weak entity tag.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Current status.
    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    /// Reason given with the current status.
    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    /// When the status last changed.
    pub fn status_updated_time(&self) -> Option<&str> {
        self.status_updated_time.as_deref()
    }

    /// Connection state as reported by the service.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    /// When the connection state last changed.
    pub fn connection_state_updated_time(&self) -> Option<&str> {
        self.connection_state_updated_time.as_deref()
    }

    /// Last time the device authenticated, sent, or received.
    pub fn last_activity_time(&self) -> Option<&str> {
        self.last_activity_time.as_deref()
    }
}

fn replace_if_different(slot: &mut Option<String>, value: Option<String>) -> bool {
    match value {
        Some(value) if slot.as_deref() != Some(value.as_str()) => {
            *slot = Some(value);
            true
        }
        _ => false,
    }
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn put(map: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value.to_string()));
    }
}
