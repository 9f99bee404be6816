use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::info;

use crate::backend::{Backend, NAME_LABEL};
use crate::models::{LabelSet, Sample, SampleStream, TargetsSnapshot};
use crate::shape;
use crate::translate::Translator;
use crate::{GatewayError, Result};

pub const DEFAULT_STEP_MINUTES: i64 = 1;
pub const DEFAULT_HISTORY_MINUTES: i64 = 100;

/// Label, series, and name lookups cover this trailing window.
const LABEL_LOOKBACK_HOURS: i64 = 1;

/// One generated query capability, bound to a metric name at startup and
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicField {
    pub metric: String,
    pub default_step_minutes: i64,
    pub default_history_minutes: i64,
}

impl DynamicField {
    fn new(metric: String) -> Self {
        Self {
            metric,
            default_step_minutes: DEFAULT_STEP_MINUTES,
            default_history_minutes: DEFAULT_HISTORY_MINUTES,
        }
    }

    /// The expression this field evaluates: a step-sized moving average of
    /// the bound metric.
    pub fn expression(&self, step_minutes: i64) -> String {
        format!("avg_over_time({}[{}m])", self.metric, step_minutes)
    }
}

/// Ask the backend for every metric name it currently knows and build one
/// field per distinct name. Runs exactly once, before the surface is
/// published; a failure here must abort startup.
pub async fn synthesize(backend: &dyn Backend) -> Result<BTreeMap<String, DynamicField>> {
    let (start, end) = label_window();
    let names = backend.label_values(NAME_LABEL, &[], start, end).await?;

    let mut fields = BTreeMap::new();
    for name in names {
        fields
            .entry(name.clone())
            .or_insert_with(|| DynamicField::new(name));
    }
    info!("synthesized {} dynamic query fields", fields.len());
    Ok(fields)
}

fn label_window() -> (DateTime<Utc>, DateTime<Utc>) {
    let end = Utc::now();
    (end - Duration::hours(LABEL_LOOKBACK_HOURS), end)
}

/// Built-in operations, always present regardless of what the backend knows.
const BUILTIN_FIELDS: &[&str] = &[
    "query",
    "queryRange",
    "labelValues",
    "nameValues",
    "labels",
    "series",
    "targets",
];

/// The published query surface: built-in operations plus the dynamic field
/// registry. Built once at startup, then read-only; share it behind an `Arc`.
pub struct QuerySurface {
    backend: Arc<dyn Backend>,
    translator: Translator,
    fields: BTreeMap<String, DynamicField>,
}

impl QuerySurface {
    pub fn new(backend: Arc<dyn Backend>, fields: BTreeMap<String, DynamicField>) -> Self {
        let translator = Translator::new(backend.clone());
        Self {
            backend,
            translator,
            fields,
        }
    }

    /// Every resolvable field name, built-ins first.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_FIELDS.iter().map(|s| s.to_string()).collect();
        names.extend(self.fields.keys().cloned());
        names
    }

    pub fn dynamic_fields(&self) -> &BTreeMap<String, DynamicField> {
        &self.fields
    }

    pub async fn query(&self, expr: &str) -> Result<Vec<Sample>> {
        self.translator.translate_instant(expr).await
    }

    pub async fn query_range(
        &self,
        expr: &str,
        step_minutes: i64,
        history_minutes: i64,
    ) -> Result<Vec<SampleStream>> {
        self.translator
            .translate_range(expr, step_minutes, history_minutes)
            .await
    }

    pub async fn label_values(&self, label: &str) -> Result<Vec<String>> {
        let (start, end) = label_window();
        self.backend.label_values(label, &[], start, end).await
    }

    pub async fn name_values(&self) -> Result<Vec<String>> {
        self.label_values(NAME_LABEL).await
    }

    pub async fn labels(&self) -> Result<Vec<String>> {
        let (start, end) = label_window();
        self.backend.label_names(&[], start, end).await
    }

    pub async fn series(&self, matchers: &[String]) -> Result<Vec<LabelSet>> {
        let (start, end) = label_window();
        self.backend.series(matchers, start, end).await
    }

    pub async fn targets(&self) -> Result<TargetsSnapshot> {
        self.backend.targets().await
    }

    /// Dispatch one surface request and shape the result for the wire.
    pub async fn resolve(&self, field: &str, args: &Map<String, Value>) -> Result<Value> {
        match field {
            "query" => {
                let expr = str_arg(args, "query")?;
                let samples = self.query(&expr).await?;
                to_json(&shape::samples(&samples))
            }
            "queryRange" => {
                let expr = str_arg(args, "query")?;
                let step = int_arg_or(args, "stepMinutes", DEFAULT_STEP_MINUTES)?;
                let history = int_arg_or(args, "historyMinutes", DEFAULT_HISTORY_MINUTES)?;
                let streams = self.query_range(&expr, step, history).await?;
                to_json(&shape::sample_streams(&streams))
            }
            "labelValues" => {
                let label = str_arg(args, "label")?;
                to_json(&self.label_values(&label).await?)
            }
            "nameValues" => to_json(&self.name_values().await?),
            "labels" => to_json(&self.labels().await?),
            "series" => {
                let matchers = str_list_arg(args, "match")?;
                let sets = self.series(&matchers).await?;
                to_json(&shape::label_sets(&sets))
            }
            "targets" => {
                let snapshot = self.targets().await?;
                to_json(&shape::targets(&snapshot))
            }
            name => match self.fields.get(name) {
                Some(dynamic) => {
                    let step = int_arg_or(args, "stepMinutes", dynamic.default_step_minutes)?;
                    let history =
                        int_arg_or(args, "historyMinutes", dynamic.default_history_minutes)?;
                    let expr = dynamic.expression(step);
                    let streams = self.query_range(&expr, step, history).await?;
                    to_json(&shape::sample_streams(&streams))
                }
                None => Err(GatewayError::NotFound(format!(
                    "unknown query field {:?}",
                    name
                ))),
            },
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(GatewayError::from)
}

fn str_arg(args: &Map<String, Value>, name: &str) -> Result<String> {
    match args.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(GatewayError::Query(format!(
            "argument {:?} must be a string, got {}",
            name, other
        ))),
        None => Err(GatewayError::Query(format!("missing argument {:?}", name))),
    }
}

fn int_arg_or(args: &Map<String, Value>, name: &str, default: i64) -> Result<i64> {
    match args.get(name) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            GatewayError::Query(format!("argument {:?} must be an integer", name))
        }),
        Some(Value::Null) | None => Ok(default),
        Some(other) => Err(GatewayError::Query(format!(
            "argument {:?} must be an integer, got {}",
            name, other
        ))),
    }
}

fn str_list_arg(args: &Map<String, Value>, name: &str) -> Result<Vec<String>> {
    match args.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(GatewayError::Query(format!(
                    "argument {:?} must contain strings, got {}",
                    name, other
                ))),
            })
            .collect(),
        // A single matcher may be passed without the surrounding list.
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(other) => Err(GatewayError::Query(format!(
            "argument {:?} must be a list of strings, got {}",
            name, other
        ))),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::backend::testing::{MockBackend, RecordedCall};
    use crate::models::{QueryValue, SamplePair};

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("args fixture must be an object"),
        }
    }

    fn up_stream() -> SampleStream {
        let mut metric = HashMap::new();
        metric.insert("__name__".to_string(), "up".to_string());
        SampleStream {
            metric,
            values: vec![SamplePair { timestamp: 1702500000.0, value: 1.0 }],
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_synthesize_dedups_metric_names() {
        let backend = MockBackend {
            label_values_response: vec![
                "cpu_usage".to_string(),
                "cpu_usage".to_string(),
                "mem_usage".to_string(),
            ],
            ..Default::default()
        };

        let fields = synthesize(&backend).await.unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains_key("cpu_usage"));
        assert!(fields.contains_key("mem_usage"));
    }

    #[tokio::test]
    async fn test_synthesize_queries_the_name_label() {
        let backend = MockBackend::default();
        synthesize(&backend).await.unwrap();

        assert_eq!(
            backend.calls(),
            vec![RecordedCall::LabelValues {
                label: "__name__".to_string(),
                matchers: vec![],
            }]
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_synthesize_failure_aborts() {
        let backend = MockBackend {
            fail_label_values: true,
            ..Default::default()
        };

        let err = synthesize(&backend).await.unwrap_err();
        assert!(matches!(err, GatewayError::Connection(_)));
    }

    #[tokio::test]
    async fn test_dynamic_field_uses_defaults() {
        let backend = Arc::new(MockBackend {
            range_response: Some(QueryValue::Matrix(vec![up_stream()])),
            ..Default::default()
        });
        let mut fields = BTreeMap::new();
        fields.insert(
            "http_requests_total".to_string(),
            DynamicField::new("http_requests_total".to_string()),
        );
        let surface = QuerySurface::new(backend.clone(), fields);

        surface
            .resolve("http_requests_total", &Map::new())
            .await
            .unwrap();

        match &backend.calls()[0] {
            RecordedCall::Range { expr, window } => {
                assert_eq!(expr, "avg_over_time(http_requests_total[1m])");
                assert_eq!(window.end - window.start, Duration::minutes(100));
                assert_eq!(window.step, Duration::minutes(1));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dynamic_field_honors_caller_arguments() {
        let backend = Arc::new(MockBackend {
            range_response: Some(QueryValue::Matrix(vec![])),
            ..Default::default()
        });
        let mut fields = BTreeMap::new();
        fields.insert(
            "cpu_usage".to_string(),
            DynamicField::new("cpu_usage".to_string()),
        );
        let surface = QuerySurface::new(backend.clone(), fields);

        surface
            .resolve(
                "cpu_usage",
                &args(json!({"stepMinutes": 5, "historyMinutes": 60})),
            )
            .await
            .unwrap();

        match &backend.calls()[0] {
            RecordedCall::Range { expr, window } => {
                assert_eq!(expr, "avg_over_time(cpu_usage[5m])");
                assert_eq!(window.end - window.start, Duration::minutes(60));
                assert_eq!(window.step, Duration::minutes(5));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_query_range_passes_window_arguments() {
        let backend = Arc::new(MockBackend {
            range_response: Some(QueryValue::Matrix(vec![up_stream()])),
            ..Default::default()
        });
        let surface = QuerySurface::new(backend.clone(), BTreeMap::new());

        let data = surface
            .resolve(
                "queryRange",
                &args(json!({"query": "up", "stepMinutes": 1, "historyMinutes": 10})),
            )
            .await
            .unwrap();

        match &backend.calls()[0] {
            RecordedCall::Range { expr, window } => {
                assert_eq!(expr, "up");
                assert_eq!(window.end - window.start, Duration::minutes(10));
                assert_eq!(window.step, Duration::minutes(1));
            }
            other => panic!("unexpected call {:?}", other),
        }
        assert_eq!(data.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_query_returns_instant_samples() {
        let mut metric = HashMap::new();
        metric.insert("__name__".to_string(), "up".to_string());
        let backend = Arc::new(MockBackend {
            instant_response: Some(QueryValue::Vector(vec![Sample {
                metric,
                timestamp: 1702500000.0,
                value: 1.0,
            }])),
            ..Default::default()
        });
        let surface = QuerySurface::new(backend, BTreeMap::new());

        let data = surface
            .resolve("query", &args(json!({"query": "up"})))
            .await
            .unwrap();
        assert_eq!(data[0]["timestamp"], json!(1702500000));
        assert_eq!(data[0]["value"], json!(1.0));
    }

    #[tokio::test]
    async fn test_name_values_aliases_the_name_label() {
        let backend = Arc::new(MockBackend {
            label_values_response: vec!["up".to_string()],
            ..Default::default()
        });
        let surface = QuerySurface::new(backend.clone(), BTreeMap::new());

        let values = surface.name_values().await.unwrap();
        assert_eq!(values, vec!["up"]);
        assert_eq!(
            backend.calls(),
            vec![RecordedCall::LabelValues {
                label: "__name__".to_string(),
                matchers: vec![],
            }]
        );
    }

    #[tokio::test]
    async fn test_resolve_unknown_field_is_not_found() {
        let backend = Arc::new(MockBackend::default());
        let surface = QuerySurface::new(backend, BTreeMap::new());

        let err = surface
            .resolve("no_such_metric", &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_missing_query_argument() {
        let backend = Arc::new(MockBackend::default());
        let surface = QuerySurface::new(backend, BTreeMap::new());

        let err = surface.resolve("query", &Map::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Query(_)));
    }

    #[test]
    fn test_field_names_lists_builtins_then_dynamic() {
        let backend = Arc::new(MockBackend::default());
        let mut fields = BTreeMap::new();
        fields.insert("up".to_string(), DynamicField::new("up".to_string()));
        let surface = QuerySurface::new(backend, fields);

        let names = surface.field_names();
        assert_eq!(names.len(), BUILTIN_FIELDS.len() + 1);
        assert_eq!(names[0], "query");
        assert_eq!(names.last().unwrap(), "up");
        assert_eq!(surface.dynamic_fields().len(), 1);
    }

    #[test]
    fn test_str_list_arg_accepts_a_bare_string() {
        let matchers = str_list_arg(&args(json!({"match": "up"})), "match").unwrap();
        assert_eq!(matchers, vec!["up"]);
    }
}
