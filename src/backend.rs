use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{
    LabelSet, QueryValue, Sample, SamplePair, SampleStream, TargetsSnapshot, TimeWindow,
};
use crate::{GatewayError, Result};

/// Fixed per-call deadline for every backend operation.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// The reserved label carrying the metric name.
pub const NAME_LABEL: &str = "__name__";

/// Operations the gateway needs from the metrics backend. The translator and
/// schema layers talk to this trait, not to the HTTP client directly.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn instant_query(&self, expr: &str, at: DateTime<Utc>) -> Result<QueryValue>;

    async fn range_query(&self, expr: &str, window: &TimeWindow) -> Result<QueryValue>;

    async fn label_names(
        &self,
        matchers: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>>;

    async fn label_values(
        &self,
        label: &str,
        matchers: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>>;

    async fn series(
        &self,
        matchers: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LabelSet>>;

    async fn targets(&self) -> Result<TargetsSnapshot>;
}

/// HTTP client for a Prometheus-compatible query API. One long-lived client
/// is reused across calls; the deadline applies per call.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    base: reqwest::Url,
    client: reqwest::Client,
    log_results: bool,
}

impl PrometheusClient {
    /// Open a client against the given base address. Fails when the address
    /// does not parse as a URL.
    pub fn connect(address: &str, log_results: bool) -> Result<Self> {
        let base = reqwest::Url::parse(address).map_err(|e| {
            GatewayError::Connection(format!("invalid backend address {:?}: {}", address, e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_DEADLINE)
            .build()
            .map_err(|e| GatewayError::Connection(format!("failed to build client: {}", e)))?;
        Ok(Self {
            base,
            client,
            log_results,
        })
    }

    fn endpoint(&self, path: &str) -> Result<reqwest::Url> {
        self.base.join(path).map_err(|e| {
            GatewayError::Connection(format!("invalid endpoint {:?}: {}", path, e))
        })
    }

    async fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        op: &str,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Query(format!(
                        "{} timed out after {:?}",
                        op, REQUEST_DEADLINE
                    ))
                } else {
                    GatewayError::Connection(format!("{} failed: {}", op, e))
                }
            })?;

        let envelope: ApiEnvelope<T> = response.json().await.map_err(|e| {
            GatewayError::Decode(format!("{} returned malformed payload: {}", op, e))
        })?;

        envelope.into_data(op, self.log_results)
    }
}

fn range_params(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(&'static str, String)> {
    vec![
        ("start", start.timestamp().to_string()),
        ("end", end.timestamp().to_string()),
    ]
}

fn push_matchers(params: &mut Vec<(&'static str, String)>, matchers: &[String]) {
    for matcher in matchers {
        params.push(("match[]", matcher.clone()));
    }
}

#[async_trait]
impl Backend for PrometheusClient {
    async fn instant_query(&self, expr: &str, at: DateTime<Utc>) -> Result<QueryValue> {
        let params = vec![
            ("query", expr.to_string()),
            ("time", at.timestamp().to_string()),
        ];
        let data: RawQueryData = self
            .get_data("/api/v1/query", &params, "instant query")
            .await?;
        let value = data.into_query_value()?;
        if self.log_results {
            debug!(kind = value.kind(), query = expr, "instant query complete");
        }
        Ok(value)
    }

    async fn range_query(&self, expr: &str, window: &TimeWindow) -> Result<QueryValue> {
        let mut params = range_params(window.start, window.end);
        params.push(("query", expr.to_string()));
        params.push(("step", format!("{}s", window.step.num_seconds())));
        let data: RawQueryData = self
            .get_data("/api/v1/query_range", &params, "range query")
            .await?;
        let value = data.into_query_value()?;
        if self.log_results {
            debug!(kind = value.kind(), query = expr, "range query complete");
        }
        Ok(value)
    }

    async fn label_names(
        &self,
        matchers: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut params = range_params(start, end);
        push_matchers(&mut params, matchers);
        self.get_data("/api/v1/labels", &params, "label names").await
    }

    async fn label_values(
        &self,
        label: &str,
        matchers: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut params = range_params(start, end);
        push_matchers(&mut params, matchers);
        let path = format!("/api/v1/label/{}/values", label);
        self.get_data(&path, &params, "label values").await
    }

    async fn series(
        &self,
        matchers: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LabelSet>> {
        let mut params = range_params(start, end);
        push_matchers(&mut params, matchers);
        self.get_data("/api/v1/series", &params, "series lookup").await
    }

    async fn targets(&self) -> Result<TargetsSnapshot> {
        self.get_data("/api/v1/targets", &[], "target status").await
    }
}

// Wire envelope shared by every backend endpoint. Warnings are advisory and
// never change the outcome.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: String,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self, op: &str, log_warnings: bool) -> Result<T> {
        if self.status != "success" {
            return Err(GatewayError::Query(format!(
                "{} rejected by backend ({}): {}",
                op,
                self.error_type.unwrap_or_else(|| "unknown".to_string()),
                self.error.unwrap_or_default()
            )));
        }
        if !self.warnings.is_empty() && log_warnings {
            warn!(operation = op, warnings = ?self.warnings, "backend returned warnings");
        }
        self.data
            .ok_or_else(|| GatewayError::Decode(format!("{} returned no data", op)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum RawQueryData {
    Vector(Vec<RawInstantSeries>),
    Matrix(Vec<RawRangeSeries>),
    Scalar(RawPoint),
    String(RawPoint),
}

#[derive(Debug, Deserialize)]
struct RawInstantSeries {
    #[serde(default)]
    metric: LabelSet,
    value: RawPoint,
}

#[derive(Debug, Deserialize)]
struct RawRangeSeries {
    #[serde(default)]
    metric: LabelSet,
    #[serde(default)]
    values: Vec<RawPoint>,
}

// One wire point: [unix_seconds, "value"].
#[derive(Debug, Deserialize)]
struct RawPoint(f64, String);

fn parse_value(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| GatewayError::Decode(format!("invalid sample value {:?}: {}", raw, e)))
}

impl RawQueryData {
    fn into_query_value(self) -> Result<QueryValue> {
        match self {
            RawQueryData::Vector(series) => {
                let mut samples = Vec::with_capacity(series.len());
                for s in series {
                    samples.push(Sample {
                        metric: s.metric,
                        timestamp: s.value.0,
                        value: parse_value(&s.value.1)?,
                    });
                }
                Ok(QueryValue::Vector(samples))
            }
            RawQueryData::Matrix(series) => {
                let mut streams = Vec::with_capacity(series.len());
                for s in series {
                    let mut values = Vec::with_capacity(s.values.len());
                    for point in s.values {
                        values.push(SamplePair {
                            timestamp: point.0,
                            value: parse_value(&point.1)?,
                        });
                    }
                    streams.push(SampleStream {
                        metric: s.metric,
                        values,
                    });
                }
                Ok(QueryValue::Matrix(streams))
            }
            RawQueryData::Scalar(point) => Ok(QueryValue::Scalar(SamplePair {
                timestamp: point.0,
                value: parse_value(&point.1)?,
            })),
            RawQueryData::String(point) => Ok(QueryValue::Str {
                timestamp: point.0,
                value: point.1,
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Scripted backend used by the translator and schema tests. Records
    /// every call so tests can assert on the issued expressions and windows.
    #[derive(Default)]
    pub(crate) struct MockBackend {
        pub instant_response: Option<QueryValue>,
        pub range_response: Option<QueryValue>,
        pub label_names_response: Vec<String>,
        pub label_values_response: Vec<String>,
        pub series_response: Vec<LabelSet>,
        pub targets_response: Option<TargetsSnapshot>,
        pub fail_label_values: bool,
        pub recorded: Mutex<Vec<RecordedCall>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum RecordedCall {
        Instant { expr: String },
        Range { expr: String, window: TimeWindow },
        LabelNames { matchers: Vec<String> },
        LabelValues { label: String, matchers: Vec<String> },
        Series { matchers: Vec<String> },
        Targets,
    }

    impl MockBackend {
        pub(crate) fn calls(&self) -> Vec<RecordedCall> {
            self.recorded.lock().unwrap().clone()
        }

        fn record(&self, call: RecordedCall) {
            self.recorded.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn instant_query(&self, expr: &str, _at: DateTime<Utc>) -> Result<QueryValue> {
            self.record(RecordedCall::Instant {
                expr: expr.to_string(),
            });
            self.instant_response
                .clone()
                .ok_or_else(|| GatewayError::Query("no scripted instant response".to_string()))
        }

        async fn range_query(&self, expr: &str, window: &TimeWindow) -> Result<QueryValue> {
            self.record(RecordedCall::Range {
                expr: expr.to_string(),
                window: window.clone(),
            });
            self.range_response
                .clone()
                .ok_or_else(|| GatewayError::Query("no scripted range response".to_string()))
        }

        async fn label_names(
            &self,
            matchers: &[String],
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<String>> {
            self.record(RecordedCall::LabelNames {
                matchers: matchers.to_vec(),
            });
            Ok(self.label_names_response.clone())
        }

        async fn label_values(
            &self,
            label: &str,
            matchers: &[String],
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<String>> {
            self.record(RecordedCall::LabelValues {
                label: label.to_string(),
                matchers: matchers.to_vec(),
            });
            if self.fail_label_values {
                return Err(GatewayError::Connection(
                    "backend unreachable".to_string(),
                ));
            }
            Ok(self.label_values_response.clone())
        }

        async fn series(
            &self,
            matchers: &[String],
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<LabelSet>> {
            self.record(RecordedCall::Series {
                matchers: matchers.to_vec(),
            });
            Ok(self.series_response.clone())
        }

        async fn targets(&self) -> Result<TargetsSnapshot> {
            self.record(RecordedCall::Targets);
            self.targets_response
                .clone()
                .ok_or_else(|| GatewayError::Query("no scripted targets response".to_string()))
        }
    }
}
