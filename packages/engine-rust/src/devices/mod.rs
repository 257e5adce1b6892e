//! Device management operations.
//!
//! A small domain exercising the engine end to end: create, update and
//! delete a device against either a scripted mock or a REST endpoint, and a
//! typed listener ([`DeviceEvents`]) fed from the notification extras.

pub mod create;
pub mod delete;
pub mod update;

use std::sync::Arc;

use opflow_core::{codes, decode, Analysis, AnalyzeError, Extras, Response, Scope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::{NotificationChannel, OperationListener, OperationReceiver};
use crate::strategy::{
    HttpMethod, HttpRequest, HttpTransport, MockFixture, MockStrategy, NetworkStrategy, Strategy,
};

pub use create::{CreateDevice, NewDevice};
pub use delete::DeleteDevice;
pub use update::{DeviceUpdate, UpdateDevice};

/// Extra carrying the [`Device`] returned by the backend.
pub const EXTRA_DEVICE: &str = "device";
/// Flag set on `OK` when the backend did not know the device.
pub const EXTRA_NOT_FOUND: &str = "not_found";

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// A device as returned by the backend. Only `id` is mandatory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// ISO-8601 timestamp, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Where device requests go.
#[derive(Clone)]
pub enum DeviceBackend {
    /// Replays scripted responses, one per request.
    Mock(Arc<MockFixture<String>>),
    /// REST endpoint rooted at `base_url` (e.g. `http://host:1337/device`).
    Network {
        transport: Arc<dyn HttpTransport>,
        base_url: String,
    },
}

impl DeviceBackend {
    #[must_use]
    pub fn mock(fixture: MockFixture<String>) -> Self {
        Self::Mock(Arc::new(fixture))
    }

    #[must_use]
    pub fn network(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        Self::Network {
            transport,
            base_url: base_url.into(),
        }
    }

    /// Strategy for one request on `path` below the base URL.
    pub(crate) fn strategy(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Box<dyn Strategy<Output = String>> {
        match self {
            Self::Mock(fixture) => Box::new(MockStrategy::new(Arc::clone(fixture))),
            Self::Network {
                transport,
                base_url,
            } => {
                let url = format!("{}/{}", base_url.trim_end_matches('/'), path);
                let mut request = HttpRequest::new(method, url);
                request.body = body;
                Box::new(NetworkStrategy::new(Arc::clone(transport), request))
            }
        }
    }
}

/// Shared analysis of update and delete: 404 is a successful "not found",
/// 200 carries the device.
pub(crate) fn analyze_found_device(response: &Response<String>) -> Result<Analysis, AnalyzeError> {
    match response.code {
        codes::NOT_FOUND => Ok(Analysis::Ok(
            Extras::new().with_flag(EXTRA_NOT_FOUND, true),
        )),
        codes::OK => device_extras(&response.payload),
        code => Err(AnalyzeError::Unexpected { code }),
    }
}

pub(crate) fn device_extras(payload: &str) -> Result<Analysis, AnalyzeError> {
    let device: Device = decode(payload)?;
    Ok(Analysis::Ok(Extras::new().with(EXTRA_DEVICE, &device)?))
}

// ---------------------------------------------------------------------------
// DeviceEvents
// ---------------------------------------------------------------------------

/// Typed callbacks for device operations.
pub trait DeviceEvents: Send + 'static {
    fn on_no_connectivity(&mut self) {}

    fn on_start(&mut self) {}

    fn on_success(&mut self, device: Device);

    /// The backend did not know the device. Only update and delete report this.
    fn on_not_found(&mut self) {}

    fn on_error(&mut self);

    fn on_finish(&mut self) {}
}

/// Adapts [`DeviceEvents`] to the generic [`OperationListener`].
///
/// An `OK` carrying neither a device nor the not-found flag is reported as
/// an error.
pub struct DeviceListener<E>(pub E);

impl<E: DeviceEvents> OperationListener for DeviceListener<E> {
    fn on_no_connectivity(&mut self) {
        self.0.on_no_connectivity();
    }

    fn on_start(&mut self) {
        self.0.on_start();
    }

    fn on_finish(&mut self) {
        self.0.on_finish();
    }

    fn on_result_ok(&mut self, extras: &Extras) {
        if extras.flag(EXTRA_NOT_FOUND) {
            self.0.on_not_found();
            return;
        }
        match extras.get::<Device>(EXTRA_DEVICE) {
            Some(device) => self.0.on_success(device),
            None => {
                tracing::warn!("OK notification without a device");
                self.0.on_error();
            }
        }
    }

    fn on_result_error(&mut self, _extras: &Extras) {
        self.0.on_error();
    }
}

/// Starts delivering device notifications of `scope` into `events`.
pub fn listen<E: DeviceEvents>(
    channel: &NotificationChannel,
    scope: Scope,
    events: E,
) -> OperationReceiver {
    OperationReceiver::start(channel, scope, DeviceListener(events))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use parking_lot::Mutex;

    use opflow_core::{EventKind, Notification, NotificationAddress};

    use super::*;
    use crate::channel::receiver::dispatch;
    use crate::strategy::{HttpReply, TransportError};

    /// Records device callbacks as short strings.
    #[derive(Clone, Default)]
    pub(crate) struct EventLog(pub Arc<Mutex<Vec<String>>>);

    impl EventLog {
        pub(crate) fn entries(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    impl DeviceEvents for EventLog {
        fn on_no_connectivity(&mut self) {
            self.0.lock().push("no_connectivity".into());
        }
        fn on_start(&mut self) {
            self.0.lock().push("start".into());
        }
        fn on_success(&mut self, device: Device) {
            self.0.lock().push(format!("success:{}", device.id));
        }
        fn on_not_found(&mut self) {
            self.0.lock().push("not_found".into());
        }
        fn on_error(&mut self) {
            self.0.lock().push("error".into());
        }
        fn on_finish(&mut self) {
            self.0.lock().push("finish".into());
        }
    }

    fn ok_with(extras: Extras) -> Notification {
        Notification {
            address: NotificationAddress::new("UpdateDevice", "", EventKind::Ok),
            sequence: 0,
            extras,
        }
    }

    #[test]
    fn minimal_device_payload_decodes() {
        let device: Device = decode(r#"{"id":"1"}"#).unwrap();
        assert_eq!(
            device,
            Device {
                id: "1".into(),
                ..Device::default()
            }
        );
    }

    #[test]
    fn full_device_payload_uses_camel_case() {
        let device: Device = decode(
            r#"{"createdAt":"2015-08-05T11:14:45.374Z","id":"2","name":"S3","resolution":"720x1280","updatedAt":"2015-08-05T11:14:45.374Z"}"#,
        )
        .unwrap();
        assert_eq!(device.name.as_deref(), Some("S3"));
        assert_eq!(device.created_at.as_deref(), Some("2015-08-05T11:14:45.374Z"));
    }

    #[test]
    fn found_device_analysis() {
        let not_found = analyze_found_device(&Response::new(404, String::new())).unwrap();
        assert_eq!(
            not_found,
            Analysis::Ok(Extras::new().with_flag(EXTRA_NOT_FOUND, true))
        );
        assert!(matches!(
            analyze_found_device(&Response::new(200, r#"{"id":"9"}"#.into())),
            Ok(Analysis::Ok(extras)) if extras.get::<Device>(EXTRA_DEVICE).unwrap().id == "9"
        ));
        assert!(matches!(
            analyze_found_device(&Response::new(200, String::new())),
            Err(AnalyzeError::Decode(_))
        ));
        assert!(matches!(
            analyze_found_device(&Response::new(503, String::new())),
            Err(AnalyzeError::Unexpected { code: 503 })
        ));
    }

    #[test]
    fn listener_maps_extras_to_callbacks() {
        let log = EventLog::default();
        let mut listener = DeviceListener(log.clone());

        let device = Extras::new()
            .with(EXTRA_DEVICE, &Device { id: "4".into(), ..Device::default() })
            .unwrap();
        dispatch(&mut listener, &ok_with(device));
        dispatch(&mut listener, &ok_with(Extras::new().with_flag(EXTRA_NOT_FOUND, true)));
        dispatch(&mut listener, &ok_with(Extras::new()));

        assert_eq!(log.entries(), vec!["success:4", "not_found", "error"]);
    }

    #[tokio::test]
    async fn network_backend_joins_paths() {
        let transport = Arc::new(RecordingTransport::replying(204, ""));
        let backend = DeviceBackend::network(transport.clone(), "http://devices.test/device/");
        let mut strategy = backend.strategy(HttpMethod::Delete, "7", None);
        assert_eq!(strategy.name(), "network");

        assert_eq!(strategy.execute().await.code(), Some(204));
        let seen = transport.requests();
        assert_eq!(seen[0].url, "http://devices.test/device/7");
        assert_eq!(seen[0].method, HttpMethod::Delete);
    }

    /// Transport answering every request with one canned reply.
    pub(crate) struct RecordingTransport {
        reply: HttpReply,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingTransport {
        pub(crate) fn replying(status: u16, body: &str) -> Self {
            Self {
                reply: HttpReply {
                    status,
                    body: body.to_string(),
                },
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn requests(&self) -> Vec<HttpRequest> {
            self.seen.lock().clone()
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for RecordingTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
            self.seen.lock().push(request);
            Ok(self.reply.clone())
        }
    }
}
