use std::sync::Arc;

use chrono::Utc;

use crate::backend::Backend;
use crate::models::{QueryValue, Sample, SampleStream, TimeWindow};
use crate::{GatewayError, Result};

/// Turns a declarative query request into one backend round trip and checks
/// that the returned shape matches the requested one. No caching, no retry.
#[derive(Clone)]
pub struct Translator {
    backend: Arc<dyn Backend>,
}

impl Translator {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Evaluate `expr` across the trailing history window. The backend must
    /// answer with a matrix; anything else is a contract violation.
    pub async fn translate_range(
        &self,
        expr: &str,
        step_minutes: i64,
        history_minutes: i64,
    ) -> Result<Vec<SampleStream>> {
        let window = TimeWindow::trailing(step_minutes, history_minutes, Utc::now())?;
        match self.backend.range_query(expr, &window).await? {
            QueryValue::Matrix(streams) => Ok(streams),
            other => Err(GatewayError::ShapeMismatch(format!(
                "range query {:?} returned a {} result, expected matrix",
                expr,
                other.kind()
            ))),
        }
    }

    /// Evaluate `expr` at the current instant. The backend must answer with a
    /// vector.
    pub async fn translate_instant(&self, expr: &str) -> Result<Vec<Sample>> {
        match self.backend.instant_query(expr, Utc::now()).await? {
            QueryValue::Vector(samples) => Ok(samples),
            other => Err(GatewayError::ShapeMismatch(format!(
                "instant query {:?} returned a {} result, expected vector",
                expr,
                other.kind()
            ))),
        }
    }
}
