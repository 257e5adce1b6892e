//! Create a device.
//!
//! The backend request is the primary strategy. When a history repository
//! is configured, the request is also recorded locally by a second strategy
//! that runs concurrently; its verdict does not affect the result.

use std::sync::Arc;

use opflow_core::{codes, Analysis, AnalyzeError, ResultPolicy, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{device_extras, DeviceBackend};
use crate::operation::OperationKind;
use crate::strategy::{
    analyzed, BoxStrategy, HttpMethod, KeyValueRepository, StorageAction, StorageStrategy,
};

/// Repository key under which the last create request is kept.
pub const LAST_CREATE_KEY: &str = "devices.last_create";

/// Arguments of a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDevice {
    pub name: String,
    pub resolution: String,
}

pub struct CreateDevice {
    backend: DeviceBackend,
    history: Option<Arc<dyn KeyValueRepository>>,
}

impl CreateDevice {
    #[must_use]
    pub fn new(backend: DeviceBackend) -> Self {
        Self {
            backend,
            history: None,
        }
    }

    /// Also records every request in `repository`.
    #[must_use]
    pub fn with_history(mut self, repository: Arc<dyn KeyValueRepository>) -> Self {
        self.history = Some(repository);
        self
    }
}

fn analyze_created(response: &Response<String>) -> Result<Analysis, AnalyzeError> {
    match response.code {
        codes::CREATED => device_extras(&response.payload),
        code => Err(AnalyzeError::Unexpected { code }),
    }
}

fn analyze_recorded(response: &Response<Option<Value>>) -> Result<Analysis, AnalyzeError> {
    match response.code {
        codes::OK | codes::CREATED => Ok(Analysis::ok()),
        code => Err(AnalyzeError::Unexpected { code }),
    }
}

impl OperationKind for CreateDevice {
    type Args = NewDevice;

    fn type_name(&self) -> &'static str {
        "CreateDevice"
    }

    fn strategies(&self, args: &NewDevice) -> Vec<BoxStrategy> {
        let body = serde_json::json!({
            "name": args.name,
            "resolution": args.resolution,
        });

        let mut strategies = vec![analyzed(
            self.backend.strategy(HttpMethod::Post, "", Some(body.clone())),
            analyze_created,
        )];
        if let Some(history) = &self.history {
            let record = StorageAction::Put {
                key: LAST_CREATE_KEY.to_string(),
                value: body,
            };
            strategies.push(analyzed(
                StorageStrategy::new(Arc::clone(history), record),
                analyze_recorded,
            ));
        }
        strategies
    }

    fn result_policy(&self) -> ResultPolicy {
        ResultPolicy::Primary(0)
    }
}
