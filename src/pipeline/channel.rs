//! Measurement channels sampled by a pipeline.

use std::sync::Arc;

use crate::model::SignalModel;
use crate::storage::MeasurementKind;

/// One measurement family: which sensors to sample and with which model.
#[derive(Clone)]
pub struct Channel {
    kind: MeasurementKind,
    sensors: Vec<i64>,
    model: Arc<dyn SignalModel>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("kind", &self.kind)
            .field("sensors", &self.sensors)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Create a channel. `sensors` are the external sensor numbers, in the
    /// order the model indexes them.
    pub fn new(kind: MeasurementKind, sensors: Vec<i64>, model: impl SignalModel) -> Self {
        Self {
            kind,
            sensors,
            model: Arc::new(model),
        }
    }

    /// Measurement family.
    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    /// External sensor numbers.
    pub fn sensors(&self) -> &[i64] {
        &self.sensors
    }

    /// Signal model shared by all sensors of the channel.
    pub fn model(&self) -> &dyn SignalModel {
        self.model.as_ref()
    }
}
