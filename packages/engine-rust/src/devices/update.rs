//! Update a device.

use opflow_core::{Analysis, AnalyzeError, Response};
use serde::{Deserialize, Serialize};

use super::{analyze_found_device, DeviceBackend};
use crate::operation::SingleStrategyKind;
use crate::strategy::{HttpMethod, Strategy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub id: String,
    pub name: String,
    pub resolution: String,
}

/// `PUT {base}/{id}`. Reports the updated device, or `not_found`.
pub struct UpdateDevice {
    backend: DeviceBackend,
}

impl UpdateDevice {
    #[must_use]
    pub fn new(backend: DeviceBackend) -> Self {
        Self { backend }
    }
}

impl SingleStrategyKind for UpdateDevice {
    type Args = DeviceUpdate;
    type Output = String;

    fn type_name(&self) -> &'static str {
        "UpdateDevice"
    }

    fn strategy(&self, args: &DeviceUpdate) -> Box<dyn Strategy<Output = String>> {
        let body = serde_json::json!({
            "name": args.name,
            "resolution": args.resolution,
        });
        self.backend.strategy(HttpMethod::Put, &args.id, Some(body))
    }

    fn analyze_result(&self, response: &Response<String>) -> Result<Analysis, AnalyzeError> {
        analyze_found_device(response)
    }
}
