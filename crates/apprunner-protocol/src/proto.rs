//! Wire messages of the `jungletv` application runtime package.
//!
//! Field numbers and the oneof discriminant of [`ApplicationEventStreamUpdate`]
//! are part of the contract and must never be renumbered.

/// Identifies one page instance of one application.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResolveApplicationPageRequest {
    #[prost(string, tag = "1")]
    pub application_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub page_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResolveApplicationPageResponse {
    #[prost(string, tag = "1")]
    pub application_file_name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub page_title: ::prost::alloc::string::String,
    /// Unset when the application has no tracked version.
    #[prost(message, optional, tag = "3")]
    pub application_version: ::core::option::Option<::prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConsumeApplicationEventStreamRequest {
    #[prost(string, tag = "1")]
    pub application_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub page_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplicationEventStreamUpdate {
    #[prost(oneof = "application_event_stream_update::Type", tags = "1, 2")]
    pub r#type: ::core::option::Option<application_event_stream_update::Type>,
}

/// Nested types for [`ApplicationEventStreamUpdate`].
pub mod application_event_stream_update {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Heartbeat(super::ApplicationHeartbeatEvent),
        #[prost(message, tag = "2")]
        ApplicationEvent(super::ApplicationServerEvent),
    }
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ApplicationHeartbeatEvent {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplicationServerEvent {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "2")]
    pub arguments: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplicationServerMethodRequest {
    #[prost(string, tag = "1")]
    pub application_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub method: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "3")]
    pub arguments: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplicationServerMethodResponse {
    #[prost(string, tag = "1")]
    pub result: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TriggerApplicationEventRequest {
    #[prost(string, tag = "1")]
    pub application_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub page_id: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "4")]
    pub arguments: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct TriggerApplicationEventResponse {}

include!(concat!(env!("OUT_DIR"), "/jungletv.ApplicationRuntime.rs"));

#[cfg(test)]
mod tests {
    use super::application_event_stream_update::Type;
    use super::*;
    use prost::Message;

    #[test]
    fn test_heartbeat_wire_bytes() {
        let update = ApplicationEventStreamUpdate {
            r#type: Some(Type::Heartbeat(ApplicationHeartbeatEvent {})),
        };
        // field 1, length-delimited, empty payload
        assert_eq!(update.encode_to_vec(), vec![0x0a, 0x00]);
    }

    #[test]
    fn test_application_event_bytes_reencode_identically() {
        // field 2 { name = "a", arguments = ["x", "y"] }
        let bytes = vec![
            0x12, 0x09, 0x0a, 0x01, b'a', 0x12, 0x01, b'x', 0x12, 0x01, b'y',
        ];
        let decoded = ApplicationEventStreamUpdate::decode(bytes.as_slice()).unwrap();
        match &decoded.r#type {
            Some(Type::ApplicationEvent(event)) => {
                assert_eq!(event.name, "a");
                assert_eq!(event.arguments, vec!["x", "y"]);
            }
            other => panic!("unexpected update: {other:?}"),
        }
        assert_eq!(decoded.encode_to_vec(), bytes);
    }

    #[test]
    fn test_last_oneof_member_wins_on_decode() {
        // heartbeat followed by an application event: protobuf keeps the last one
        let bytes = vec![0x0a, 0x00, 0x12, 0x03, 0x0a, 0x01, b'e'];
        let decoded = ApplicationEventStreamUpdate::decode(bytes.as_slice()).unwrap();
        assert!(matches!(decoded.r#type, Some(Type::ApplicationEvent(_))));
    }

    #[test]
    fn test_absent_version_is_not_encoded() {
        let response = ResolveApplicationPageResponse {
            application_file_name: "f".to_string(),
            page_title: String::new(),
            application_version: None,
        };
        assert_eq!(response.encode_to_vec(), vec![0x0a, 0x01, b'f']);

        let with_epoch = ResolveApplicationPageResponse {
            application_version: Some(::prost_types::Timestamp::default()),
            ..response
        };
        // zero timestamp is still present as an empty sub-message
        assert_eq!(
            with_epoch.encode_to_vec(),
            vec![0x0a, 0x01, b'f', 0x1a, 0x00]
        );
    }

    #[test]
    fn test_trigger_request_field_numbers() {
        let request = TriggerApplicationEventRequest {
            application_id: "a".to_string(),
            page_id: "p".to_string(),
            name: "n".to_string(),
            arguments: vec!["1".to_string()],
        };
        assert_eq!(
            request.encode_to_vec(),
            vec![
                0x0a, 0x01, b'a', 0x12, 0x01, b'p', 0x1a, 0x01, b'n', 0x22, 0x01, b'1'
            ]
        );
    }
}
