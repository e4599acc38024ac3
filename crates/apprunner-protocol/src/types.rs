//! Domain-side view of the contract.
//!
//! The prost messages in [`crate::proto`] allow states the contract forbids
//! (an update with no variant set, a version that cannot be represented).
//! These types rule them out, and the conversions below are where the wire
//! form is checked.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proto;
use crate::proto::application_event_stream_update::Type as UpdateType;

/// Errors raised while converting wire messages into domain types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("event stream update has no variant set")]
    MissingUpdateType,

    #[error("timestamp out of range: {seconds}s {nanos}ns")]
    InvalidTimestamp { seconds: i64, nanos: i32 },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// One page instance of one application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub application_id: String,
    pub page_id: String,
}

impl PageRef {
    pub fn new(application_id: impl Into<String>, page_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            page_id: page_id.into(),
        }
    }

    /// Both identifiers are opaque but must be present.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.application_id.is_empty() {
            return Err(ProtocolError::EmptyField("application_id"));
        }
        if self.page_id.is_empty() {
            return Err(ProtocolError::EmptyField("page_id"));
        }
        Ok(())
    }
}

impl std::fmt::Display for PageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.application_id, self.page_id)
    }
}

/// Result of resolving a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPage {
    pub application_file_name: String,
    pub page_title: String,
    /// `None` when the application version is not tracked. Distinct from the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_version: Option<DateTime<Utc>>,
}

/// A named event carrying ordered, JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationEvent {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl ApplicationEvent {
    pub fn new(name: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// One item of an event stream. Exactly one variant is ever active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamUpdate {
    /// Liveness signal only.
    Heartbeat,
    /// Event emitted by the application for this page.
    Event(ApplicationEvent),
}

impl StreamUpdate {
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }

    pub fn into_event(self) -> Option<ApplicationEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Heartbeat => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInvocation {
    pub application_id: String,
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodResult {
    /// Opaque, application-defined payload (JSON by convention).
    pub result: String,
}

/// Client-to-server mirror of [`ApplicationEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTrigger {
    pub application_id: String,
    pub page_id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl EventTrigger {
    pub fn page(&self) -> PageRef {
        PageRef::new(&self.application_id, &self.page_id)
    }
}

// -- timestamps --

const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// Canonical Timestamp for `value`. A leap second (subsecond nanos past one
/// second) rolls over into the next second.
pub fn timestamp_from_datetime(value: DateTime<Utc>) -> prost_types::Timestamp {
    let nanos = value.timestamp_subsec_nanos();
    prost_types::Timestamp {
        seconds: value.timestamp() + i64::from(nanos / NANOS_PER_SECOND),
        nanos: (nanos % NANOS_PER_SECOND) as i32,
    }
}

pub fn datetime_from_timestamp(
    value: &prost_types::Timestamp,
) -> Result<DateTime<Utc>, ProtocolError> {
    let invalid = ProtocolError::InvalidTimestamp {
        seconds: value.seconds,
        nanos: value.nanos,
    };
    let nanos = u32::try_from(value.nanos).map_err(|_| invalid.clone())?;
    DateTime::from_timestamp(value.seconds, nanos).ok_or(invalid)
}

// -- wire conversions --

impl From<PageRef> for proto::ResolveApplicationPageRequest {
    fn from(page: PageRef) -> Self {
        Self {
            application_id: page.application_id,
            page_id: page.page_id,
        }
    }
}

impl From<proto::ResolveApplicationPageRequest> for PageRef {
    fn from(request: proto::ResolveApplicationPageRequest) -> Self {
        Self::new(request.application_id, request.page_id)
    }
}

impl From<PageRef> for proto::ConsumeApplicationEventStreamRequest {
    fn from(page: PageRef) -> Self {
        Self {
            application_id: page.application_id,
            page_id: page.page_id,
        }
    }
}

impl From<proto::ConsumeApplicationEventStreamRequest> for PageRef {
    fn from(request: proto::ConsumeApplicationEventStreamRequest) -> Self {
        Self::new(request.application_id, request.page_id)
    }
}

impl From<ResolvedPage> for proto::ResolveApplicationPageResponse {
    fn from(page: ResolvedPage) -> Self {
        Self {
            application_file_name: page.application_file_name,
            page_title: page.page_title,
            application_version: page.application_version.map(timestamp_from_datetime),
        }
    }
}

impl TryFrom<proto::ResolveApplicationPageResponse> for ResolvedPage {
    type Error = ProtocolError;

    fn try_from(response: proto::ResolveApplicationPageResponse) -> Result<Self, Self::Error> {
        let application_version = response
            .application_version
            .as_ref()
            .map(datetime_from_timestamp)
            .transpose()?;
        Ok(Self {
            application_file_name: response.application_file_name,
            page_title: response.page_title,
            application_version,
        })
    }
}

impl From<ApplicationEvent> for proto::ApplicationServerEvent {
    fn from(event: ApplicationEvent) -> Self {
        Self {
            name: event.name,
            arguments: event.arguments,
        }
    }
}

impl From<proto::ApplicationServerEvent> for ApplicationEvent {
    fn from(event: proto::ApplicationServerEvent) -> Self {
        Self {
            name: event.name,
            arguments: event.arguments,
        }
    }
}

impl From<StreamUpdate> for proto::ApplicationEventStreamUpdate {
    fn from(update: StreamUpdate) -> Self {
        let r#type = match update {
            StreamUpdate::Heartbeat => UpdateType::Heartbeat(proto::ApplicationHeartbeatEvent {}),
            StreamUpdate::Event(event) => UpdateType::ApplicationEvent(event.into()),
        };
        Self {
            r#type: Some(r#type),
        }
    }
}

impl TryFrom<proto::ApplicationEventStreamUpdate> for StreamUpdate {
    type Error = ProtocolError;

    fn try_from(update: proto::ApplicationEventStreamUpdate) -> Result<Self, Self::Error> {
        match update.r#type {
            Some(UpdateType::Heartbeat(_)) => Ok(Self::Heartbeat),
            Some(UpdateType::ApplicationEvent(event)) => Ok(Self::Event(event.into())),
            None => Err(ProtocolError::MissingUpdateType),
        }
    }
}

impl From<MethodInvocation> for proto::ApplicationServerMethodRequest {
    fn from(invocation: MethodInvocation) -> Self {
        Self {
            application_id: invocation.application_id,
            method: invocation.method,
            arguments: invocation.arguments,
        }
    }
}

impl From<proto::ApplicationServerMethodRequest> for MethodInvocation {
    fn from(request: proto::ApplicationServerMethodRequest) -> Self {
        Self {
            application_id: request.application_id,
            method: request.method,
            arguments: request.arguments,
        }
    }
}

impl From<MethodResult> for proto::ApplicationServerMethodResponse {
    fn from(result: MethodResult) -> Self {
        Self {
            result: result.result,
        }
    }
}

impl From<proto::ApplicationServerMethodResponse> for MethodResult {
    fn from(response: proto::ApplicationServerMethodResponse) -> Self {
        Self {
            result: response.result,
        }
    }
}

impl From<EventTrigger> for proto::TriggerApplicationEventRequest {
    fn from(trigger: EventTrigger) -> Self {
        Self {
            application_id: trigger.application_id,
            page_id: trigger.page_id,
            name: trigger.name,
            arguments: trigger.arguments,
        }
    }
}

impl From<proto::TriggerApplicationEventRequest> for EventTrigger {
    fn from(request: proto::TriggerApplicationEventRequest) -> Self {
        Self {
            application_id: request.application_id,
            page_id: request.page_id,
            name: request.name,
            arguments: request.arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use prost::Message;

    #[test]
    fn test_leap_second_folds_into_next_second() {
        let leap = chrono::NaiveDate::from_ymd_opt(2016, 12, 31)
            .unwrap()
            .and_hms_nano_opt(23, 59, 59, 1_500_000_000)
            .unwrap()
            .and_utc();
        let timestamp = timestamp_from_datetime(leap);

        let next = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(timestamp.seconds, next.timestamp());
        assert_eq!(timestamp.nanos, 500_000_000);

        let back = datetime_from_timestamp(&timestamp).unwrap();
        assert_eq!(back, next + chrono::Duration::milliseconds(500));
    }

    #[test]
    fn test_page_ref_validation() {
        assert!(PageRef::new("app", "page").validate().is_ok());
        assert_eq!(
            PageRef::new("", "page").validate(),
            Err(ProtocolError::EmptyField("application_id"))
        );
        assert_eq!(
            PageRef::new("app", "").validate(),
            Err(ProtocolError::EmptyField("page_id"))
        );
    }

    #[test]
    fn test_update_without_variant_is_rejected() {
        let wire = proto::ApplicationEventStreamUpdate { r#type: None };
        assert_eq!(
            StreamUpdate::try_from(wire),
            Err(ProtocolError::MissingUpdateType)
        );
    }

    #[test]
    fn test_update_bytes_survive_domain_round_trip() {
        let update = StreamUpdate::Event(ApplicationEvent::new(
            "scores",
            vec!["\"c\"".to_string(), "\"a\"".to_string(), "\"b\"".to_string()],
        ));
        let bytes = proto::ApplicationEventStreamUpdate::from(update.clone()).encode_to_vec();

        let decoded = proto::ApplicationEventStreamUpdate::decode(bytes.as_slice()).unwrap();
        let domain = StreamUpdate::try_from(decoded).unwrap();
        assert_eq!(domain, update);

        let reencoded = proto::ApplicationEventStreamUpdate::from(domain).encode_to_vec();
        assert_eq!(reencoded, bytes);
    }

    #[test]
    fn test_missing_version_stays_distinct_from_epoch() {
        let absent = ResolvedPage {
            application_file_name: "index.html".to_string(),
            page_title: "Quiz".to_string(),
            application_version: None,
        };
        let epoch = ResolvedPage {
            application_version: Some(DateTime::<Utc>::UNIX_EPOCH),
            ..absent.clone()
        };

        let absent_wire = proto::ResolveApplicationPageResponse::from(absent.clone());
        let epoch_wire = proto::ResolveApplicationPageResponse::from(epoch.clone());
        assert!(absent_wire.application_version.is_none());
        assert!(epoch_wire.application_version.is_some());

        assert_eq!(ResolvedPage::try_from(absent_wire).unwrap(), absent);
        assert_eq!(ResolvedPage::try_from(epoch_wire).unwrap(), epoch);
    }

    #[test]
    fn test_timestamp_conversion_keeps_subsecond_precision() {
        let value = Utc
            .timestamp_opt(1_700_000_000, 123_456_789)
            .single()
            .unwrap();
        let ts = timestamp_from_datetime(value);
        assert_eq!(ts.seconds, 1_700_000_000);
        assert_eq!(ts.nanos, 123_456_789);
        assert_eq!(datetime_from_timestamp(&ts).unwrap(), value);
    }

    #[test]
    fn test_negative_nanos_are_invalid() {
        let ts = prost_types::Timestamp {
            seconds: 10,
            nanos: -1,
        };
        assert!(matches!(
            datetime_from_timestamp(&ts),
            Err(ProtocolError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_stream_update_json_shape() {
        let heartbeat = serde_json::to_value(StreamUpdate::Heartbeat).unwrap();
        assert_eq!(heartbeat, serde_json::json!({ "type": "heartbeat" }));

        let event = serde_json::to_value(StreamUpdate::Event(ApplicationEvent::new(
            "tick",
            vec!["1".to_string()],
        )))
        .unwrap();
        assert_eq!(event["type"], "event");
        assert_eq!(event["name"], "tick");
        assert_eq!(event["arguments"][0], "1");
    }
}
