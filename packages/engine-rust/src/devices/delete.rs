//! Delete a device.

use opflow_core::{Analysis, AnalyzeError, Response};

use super::{analyze_found_device, DeviceBackend};
use crate::operation::SingleStrategyKind;
use crate::strategy::{HttpMethod, Strategy};

/// `DELETE {base}/{id}`. Reports the deleted device, or `not_found`.
pub struct DeleteDevice {
    backend: DeviceBackend,
}

impl DeleteDevice {
    #[must_use]
    pub fn new(backend: DeviceBackend) -> Self {
        Self { backend }
    }
}

impl SingleStrategyKind for DeleteDevice {
    /// Device id.
    type Args = str;
    type Output = String;

    fn type_name(&self) -> &'static str {
        "DeleteDevice"
    }

    fn strategy(&self, id: &str) -> Box<dyn Strategy<Output = String>> {
        self.backend.strategy(HttpMethod::Delete, id, None)
    }

    fn analyze_result(&self, response: &Response<String>) -> Result<Analysis, AnalyzeError> {
        analyze_found_device(response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use opflow_core::{EventKind, OperationSnapshot, OperationStatus, Outcome, Scope};

    use super::*;
    use crate::channel::Recorder;
    use crate::config::EngineConfig;
    use crate::context::{EngineContext, SwitchConnectivity};
    use crate::devices::tests::{EventLog, RecordingTransport};
    use crate::devices::{listen, EXTRA_NOT_FOUND};
    use crate::operation::{Operation, Single};
    use crate::strategy::MockFixture;

    const WAIT: Duration = Duration::from_secs(2);

    fn context() -> EngineContext {
        EngineContext::new(
            EngineConfig::default(),
            Arc::new(SwitchConnectivity::default()),
        )
    }

    fn mock(outcomes: Vec<Outcome<String>>) -> DeviceBackend {
        DeviceBackend::mock(MockFixture::from_outcomes("delete", outcomes))
    }

    #[tokio::test]
    async fn unknown_device_reports_not_found() {
        let ctx = context();
        let mut rec = Recorder::new(&ctx.channel, Scope::for_type("DeleteDevice"));
        let log = EventLog::default();
        let mut receiver = listen(&ctx.channel, Scope::for_instance("DeleteDevice", "row-7"), log.clone());
        let op = Operation::single(
            DeleteDevice::new(mock(vec![Outcome::response(404, String::new())])),
            ctx,
        )
        .with_instance_id("row-7");

        op.perform("7").unwrap();
        rec.wait_for(EventKind::Finish, WAIT).await.unwrap();

        assert_eq!(
            rec.events(),
            vec![EventKind::Start, EventKind::Ok, EventKind::Finish]
        );
        assert!(rec.last(EventKind::Ok).unwrap().extras.flag(EXTRA_NOT_FOUND));

        tokio::time::sleep(Duration::from_millis(20)).await;
        receiver.stop().await;
        assert_eq!(log.entries(), vec!["start", "not_found", "finish"]);
    }

    #[tokio::test]
    async fn transport_failure_reports_error() {
        let ctx = context();
        let log = EventLog::default();
        let mut receiver = listen(&ctx.channel, Scope::for_type("DeleteDevice"), log.clone());
        let mut rec = Recorder::new(&ctx.channel, Scope::for_type("DeleteDevice"));
        let op = Operation::single(
            DeleteDevice::new(mock(vec![Outcome::transport_failure("connection reset")])),
            ctx,
        );

        op.perform("1").unwrap();
        rec.wait_for(EventKind::Finish, WAIT).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        receiver.stop().await;

        assert_eq!(log.entries(), vec!["start", "error", "finish"]);
    }

    #[tokio::test]
    async fn network_delete_targets_the_device_url() {
        let ctx = context();
        let transport = Arc::new(RecordingTransport::replying(200, r#"{"id":"7"}"#));
        let mut rec = Recorder::new(&ctx.channel, Scope::for_type("DeleteDevice"));
        let op = Operation::single(
            DeleteDevice::new(DeviceBackend::network(transport.clone(), "http://d.test/device")),
            ctx,
        );

        op.perform("7").unwrap();
        rec.wait_for(EventKind::Finish, WAIT).await.unwrap();
        assert_eq!(transport.requests()[0].url, "http://d.test/device/7");
        assert_eq!(transport.requests()[0].body, None);
    }

    #[tokio::test]
    async fn in_flight_delete_survives_snapshot_restore() {
        let ctx = context();
        let mut rec = Recorder::new(&ctx.channel, Scope::for_type("DeleteDevice"));
        let op = Operation::single(
            DeleteDevice::new(mock(vec![Outcome::response(200, r#"{"id":"2"}"#.into())])),
            ctx.clone(),
        );
        op.set_connection_delay(Duration::from_millis(50));

        op.perform("2").unwrap();
        let bytes = op.snapshot().to_msgpack().unwrap();
        drop(op);

        let snapshot = OperationSnapshot::from_msgpack(&bytes).unwrap();
        let restored = Operation::restore(
            Single::new(DeleteDevice::new(mock(Vec::new()))),
            ctx,
            &snapshot,
        )
        .unwrap();
        rec.wait_for(EventKind::Finish, WAIT).await.unwrap();

        assert_eq!(
            rec.events(),
            vec![EventKind::Start, EventKind::Ok, EventKind::Finish]
        );
        assert_eq!(restored.status(), OperationStatus::Finished);
        assert_eq!(restored.connection_delay(), Duration::from_millis(50));
    }
}
