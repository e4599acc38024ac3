//! Generates the tonic client/server glue for the application runtime service.
//!
//! The messages are declared by hand in `src/proto.rs` with prost derives, so
//! only the service code is generated here and no protoc is needed.

use tonic_build::manual::{Builder, Method, Service};

const CODEC: &str = "tonic_prost::ProstCodec";

fn unary(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::proto::{input}"))
        .output_type(format!("crate::proto::{output}"))
        .codec_path(CODEC)
        .build()
}

fn main() {
    let events = Method::builder()
        .name("consume_application_events")
        .route_name("ConsumeApplicationEvents")
        .input_type("crate::proto::ConsumeApplicationEventStreamRequest")
        .output_type("crate::proto::ApplicationEventStreamUpdate")
        .codec_path(CODEC)
        .server_streaming()
        .build();

    let service = Service::builder()
        .name("ApplicationRuntime")
        .package("jungletv")
        .method(unary(
            "resolve_application_page",
            "ResolveApplicationPage",
            "ResolveApplicationPageRequest",
            "ResolveApplicationPageResponse",
        ))
        .method(events)
        .method(unary(
            "application_server_method",
            "ApplicationServerMethod",
            "ApplicationServerMethodRequest",
            "ApplicationServerMethodResponse",
        ))
        .method(unary(
            "trigger_application_event",
            "TriggerApplicationEvent",
            "TriggerApplicationEventRequest",
            "TriggerApplicationEventResponse",
        ))
        .build();

    Builder::new().compile(&[service]);
}
