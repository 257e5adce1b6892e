//! Runs the device operations once and prints the notification stream.
//!
//! # Usage
//!
//! ```bash
//! # Scripted responses, no network
//! cargo run -p opflow-engine --bin opflow-demo
//!
//! # Against a live REST backend
//! opflow-demo --base-url http://127.0.0.1:1337/device
//!
//! # Refused dispatch
//! opflow-demo --offline
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use futures_util::future::join_all;
use opflow_core::{EventKind, Outcome, Scope};
use opflow_engine::channel::Recorder;
use opflow_engine::devices::{
    listen, CreateDevice, DeleteDevice, Device, DeviceBackend, DeviceEvents, DeviceUpdate,
    NewDevice, UpdateDevice,
};
use opflow_engine::strategy::{MemoryRepository, MockFixture, ReqwestTransport};
use opflow_engine::{logging, EngineConfig, EngineContext, Operation, SwitchConnectivity};

#[derive(Parser, Debug)]
#[command(name = "opflow-demo")]
#[command(about = "Drive the device operations and print every notification", long_about = None)]
struct Args {
    /// REST endpoint for devices. Scripted responses are used when absent.
    #[arg(long, env = "OPFLOW_BASE_URL")]
    base_url: Option<String>,

    /// Request timeout for the REST backend, in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    /// Artificial delay before each strategy runs, in milliseconds
    #[arg(long, env = "OPFLOW_DELAY_MS", default_value = "0")]
    delay_ms: u64,

    /// Pretend connectivity is down
    #[arg(long)]
    offline: bool,

    /// Notification channel capacity
    #[arg(long, default_value = "1024")]
    channel_capacity: usize,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "OPFLOW_LOG", default_value = "info")]
    log_filter: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "OPFLOW_JSON_LOGS")]
    json_logs: bool,
}

/// Prints device callbacks for one operation type.
struct Printer(&'static str);

impl DeviceEvents for Printer {
    fn on_no_connectivity(&mut self) {
        println!("[{}] no connectivity", self.0);
    }

    fn on_start(&mut self) {
        println!("[{}] started", self.0);
    }

    fn on_success(&mut self, device: Device) {
        println!("[{}] success: {device:?}", self.0);
    }

    fn on_not_found(&mut self) {
        println!("[{}] not found", self.0);
    }

    fn on_error(&mut self) {
        println!("[{}] error", self.0);
    }

    fn on_finish(&mut self) {
        println!("[{}] finished", self.0);
    }
}

fn scripted(name: &str, outcomes: Vec<Outcome<String>>) -> DeviceBackend {
    DeviceBackend::mock(MockFixture::from_outcomes(name, outcomes))
}

const SAMPLE: &str = r#"{"createdAt":"2015-08-05T11:14:45.374Z","id":"1","name":"S3","resolution":"720x1280","updatedAt":"2015-08-05T11:14:45.374Z"}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = EngineConfig {
        channel_capacity: args.channel_capacity,
        default_connection_delay: Duration::from_millis(args.delay_ms),
        log_filter: args.log_filter.clone(),
        json_logs: args.json_logs,
    };
    logging::init(&config)?;

    let ctx = EngineContext::new(config, Arc::new(SwitchConnectivity::new(!args.offline)));

    let (create_backend, update_backend, delete_backend) = match &args.base_url {
        Some(base_url) => {
            let transport = Arc::new(
                ReqwestTransport::new(Duration::from_secs(args.timeout_secs))
                    .context("building HTTP client")?,
            );
            let backend = DeviceBackend::network(transport, base_url.clone());
            (backend.clone(), backend.clone(), backend)
        }
        None => (
            scripted("create", vec![Outcome::response(201, SAMPLE.to_string())]),
            scripted(
                "update",
                vec![
                    Outcome::response(404, String::new()),
                    Outcome::response(200, SAMPLE.to_string()),
                ],
            ),
            scripted("delete", vec![Outcome::response(200, SAMPLE.to_string())]),
        ),
    };

    let mut receivers = vec![
        listen(&ctx.channel, Scope::for_type("CreateDevice"), Printer("create")),
        listen(&ctx.channel, Scope::for_type("UpdateDevice"), Printer("update")),
        listen(&ctx.channel, Scope::for_type("DeleteDevice"), Printer("delete")),
    ];
    let wait = Duration::from_secs(args.timeout_secs + 1) + Duration::from_millis(args.delay_ms);

    let history = Arc::new(MemoryRepository::new());
    let create = Operation::new(
        CreateDevice::new(create_backend).with_history(history),
        ctx.clone(),
    );
    let mut events = Recorder::new(&ctx.channel, create.scope());
    let new_device = NewDevice {
        name: "S3".into(),
        resolution: "720x1280".into(),
    };
    if create.perform(&new_device)?.is_started() {
        events.wait_for(EventKind::Finish, wait).await;
    }

    let update = Operation::single(UpdateDevice::new(update_backend), ctx.clone());
    let mut events = Recorder::new(&ctx.channel, update.scope());
    let change = DeviceUpdate {
        id: "1".into(),
        name: "S3 mini".into(),
        resolution: "540x960".into(),
    };
    for _ in 0..2 {
        if update.perform(&change)?.is_started() {
            events.wait_for(EventKind::Finish, wait).await;
        }
        update.reset();
    }

    let delete = Operation::single(DeleteDevice::new(delete_backend), ctx.clone());
    let mut events = Recorder::new(&ctx.channel, delete.scope());
    if delete.perform("1")?.is_started() {
        events.wait_for(EventKind::Finish, wait).await;
    }

    // Let the receivers drain before stopping them.
    tokio::time::sleep(Duration::from_millis(50)).await;
    join_all(receivers.iter_mut().map(|receiver| receiver.stop())).await;
    Ok(())
}
