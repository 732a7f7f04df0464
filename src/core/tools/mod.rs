//! Local tools answering intercepted intents without the upstream model.
//!
//! Every tool returns a value the caller can show directly. Failures inside a
//! tool are turned into user-facing text or a `None` image here and never
//! escape as errors, except for memory persistence which the caller logs.

pub mod calculator;
mod render;
pub mod weather;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

pub use calculator::{CalcError, calculate};
pub use render::{
    CANVAS_HEIGHT, CANVAS_WIDTH, ChartKind, ChartRenderer, RasterRenderer, RenderError,
    RenderResult,
};
pub use weather::{WeatherClient, WeatherConfig, WeatherError};

use crate::core::intent::{CarouselDirection, DeviceState, Intent};
use crate::core::realtime::gemini::CURRENT_TIME_TOOL;
use crate::store::{MemoryCommand, MemoryReply, MemoryStore, StoreResult};

/// Timestamp layout used by the time tool.
const TIME_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";

/// Result of running a tool for an intercepted intent.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Text(String),
    Carousel(CarouselDirection),
    Button { name: String, state: DeviceState },
    /// Base64 PNG of a chart
    Chart { kind: ChartKind, image: String },
    /// Base64 PNG of a word cloud
    WordCloud(String),
}

/// Runs tools for intercepted intents and upstream tool calls.
#[derive(Clone)]
pub struct LocalToolExecutor {
    weather: WeatherClient,
    renderer: Arc<dyn ChartRenderer>,
    memory: MemoryStore,
}

impl LocalToolExecutor {
    pub fn new(weather: WeatherConfig, memory: MemoryStore) -> Self {
        Self::with_renderer(weather, memory, Arc::new(RasterRenderer))
    }

    pub fn with_renderer(
        weather: WeatherConfig,
        memory: MemoryStore,
        renderer: Arc<dyn ChartRenderer>,
    ) -> Self {
        Self {
            weather: WeatherClient::new(weather),
            renderer,
            memory,
        }
    }

    pub fn renderer(&self) -> &Arc<dyn ChartRenderer> {
        &self.renderer
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Current local time.
    pub fn time(&self) -> String {
        chrono::Local::now().format(TIME_FORMAT).to_string()
    }

    pub async fn weather(&self, city: Option<&str>) -> String {
        let city = city.unwrap_or_else(|| self.weather.default_city());
        self.weather.lookup(city).await
    }

    pub fn calculator(&self, expr: &str) -> String {
        calculate(expr)
    }

    /// Render a chart from raw tokens. `None` when no token parses or the
    /// renderer fails.
    ///
    /// Rasterizing runs on the blocking pool so the other relay pump keeps
    /// moving while a chart is drawn.
    pub async fn render_chart(&self, kind: ChartKind, tokens: &[String]) -> Option<String> {
        let values = parse_numbers(tokens);
        if values.is_empty() {
            tracing::debug!(chart = %kind, "No numeric values to plot");
            return None;
        }
        let renderer = Arc::clone(&self.renderer);
        match tokio::task::spawn_blocking(move || renderer.render_chart(kind, &values)).await {
            Ok(Ok(png)) => Some(BASE64.encode(png)),
            Ok(Err(e)) => {
                tracing::warn!(chart = %kind, "Chart rendering failed: {}", e);
                None
            }
            Err(e) => {
                tracing::error!(chart = %kind, "Chart rendering task failed: {}", e);
                None
            }
        }
    }

    pub async fn render_word_cloud(&self, text: &str) -> Option<String> {
        let renderer = Arc::clone(&self.renderer);
        let text = text.to_string();
        match tokio::task::spawn_blocking(move || renderer.render_word_cloud(&text)).await {
            Ok(Ok(png)) => Some(BASE64.encode(png)),
            Ok(Err(e)) => {
                tracing::warn!("Word cloud rendering failed: {}", e);
                None
            }
            Err(e) => {
                tracing::error!("Word cloud rendering task failed: {}", e);
                None
            }
        }
    }

    pub async fn memory_command(
        &self,
        command: MemoryCommand,
        key: Option<String>,
        value: Option<Value>,
    ) -> StoreResult<MemoryReply> {
        self.memory.execute_offloaded(command, key, value).await
    }

    /// Run the tool behind an intercepted intent.
    pub async fn run(&self, intent: &Intent) -> ToolResult {
        tracing::info!(tool = intent.name(), "Running local tool");

        match intent {
            Intent::Time => ToolResult::Text(format!("The current time is: {}", self.time())),
            Intent::Weather { city } => ToolResult::Text(self.weather(city.as_deref()).await),
            Intent::Calculate { expr } => ToolResult::Text(self.calculator(expr)),
            Intent::Carousel(direction) => ToolResult::Carousel(*direction),
            Intent::DeviceButton { name, state } => ToolResult::Button {
                name: name.clone(),
                state: *state,
            },
            Intent::WordCloud { text } => match self.render_word_cloud(text).await {
                Some(image) => ToolResult::WordCloud(image),
                None => ToolResult::Text("Failed to generate word cloud.".to_string()),
            },
            Intent::Chart { kind, values } => match self.render_chart(*kind, values).await {
                Some(image) => ToolResult::Chart { kind: *kind, image },
                None => ToolResult::Text(format!("Failed to generate {kind}.")),
            },
        }
    }

    /// Answer a function call issued by the upstream model.
    pub fn call_tool(&self, name: &str, _args: &Value) -> Value {
        match name {
            CURRENT_TIME_TOOL => json!({ "result": self.time() }),
            other => {
                tracing::warn!(tool = %other, "Upstream requested an unknown tool");
                json!({ "error": format!("unknown tool: {other}") })
            }
        }
    }
}

impl std::fmt::Debug for LocalToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalToolExecutor")
            .field("weather", &self.weather)
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

/// Parse tokens as floats, skipping blanks. Any unparsable token empties the
/// whole list.
pub fn parse_numbers(tokens: &[String]) -> Vec<f64> {
    tokens
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> LocalToolExecutor {
        LocalToolExecutor::new(WeatherConfig::default(), MemoryStore::in_memory())
    }

    fn tokens(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    struct FailingRenderer;

    impl ChartRenderer for FailingRenderer {
        fn render_chart(&self, _kind: ChartKind, _values: &[f64]) -> RenderResult<Vec<u8>> {
            Err(RenderError::InvalidInput("boom".to_string()))
        }

        fn render_word_cloud(&self, _text: &str) -> RenderResult<Vec<u8>> {
            Err(RenderError::Empty)
        }
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_numbers(&tokens(&["1", "", "2.5"])), vec![1.0, 2.5]);
        assert!(parse_numbers(&tokens(&["1", "x"])).is_empty());
        assert!(parse_numbers(&tokens(&[""])).is_empty());
    }

    #[test]
    fn test_time_format() {
        let time = executor().time();
        assert!(chrono::NaiveDateTime::parse_from_str(&time, TIME_FORMAT).is_ok());
        assert!(time.ends_with("AM") || time.ends_with("PM"));
    }

    #[tokio::test]
    async fn test_run_time() {
        match executor().run(&Intent::Time).await {
            ToolResult::Text(text) => assert!(text.starts_with("The current time is: ")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_calculator() {
        let result = executor()
            .run(&Intent::Calculate {
                expr: "2+2".to_string(),
            })
            .await;
        assert_eq!(result, ToolResult::Text("Result: 4".to_string()));
    }

    #[tokio::test]
    async fn test_run_chart() {
        let result = executor()
            .run(&Intent::Chart {
                kind: ChartKind::Bar,
                values: tokens(&["1", "2", "3"]),
            })
            .await;
        let ToolResult::Chart { kind, image } = result else {
            panic!("expected a chart");
        };
        assert_eq!(kind, ChartKind::Bar);
        let png = BASE64.decode(image).unwrap();
        assert!(png.starts_with(b"\x89PNG"));
    }

    #[tokio::test]
    async fn test_run_chart_without_values() {
        let result = executor()
            .run(&Intent::Chart {
                kind: ChartKind::Line,
                values: Vec::new(),
            })
            .await;
        assert_eq!(
            result,
            ToolResult::Text("Failed to generate line chart.".to_string())
        );
    }

    #[tokio::test]
    async fn test_renderer_failure_is_text() {
        let executor = LocalToolExecutor::with_renderer(
            WeatherConfig::default(),
            MemoryStore::in_memory(),
            Arc::new(FailingRenderer),
        );
        assert_eq!(
            executor
                .run(&Intent::Chart {
                    kind: ChartKind::Pie,
                    values: tokens(&["1"]),
                })
                .await,
            ToolResult::Text("Failed to generate pie chart.".to_string())
        );
        assert_eq!(
            executor
                .run(&Intent::WordCloud {
                    text: "hello".to_string()
                })
                .await,
            ToolResult::Text("Failed to generate word cloud.".to_string())
        );
    }

    #[test]
    fn test_call_tool() {
        let executor = executor();
        let ok = executor.call_tool(CURRENT_TIME_TOOL, &Value::Null);
        assert!(ok["result"].is_string());

        let err = executor.call_tool("launch_rockets", &json!({}));
        assert_eq!(err, json!({"error": "unknown tool: launch_rockets"}));
    }

    #[tokio::test]
    async fn test_memory_command() {
        let executor = executor();
        let reply = executor
            .memory_command(MemoryCommand::Enable, None, None)
            .await
            .unwrap();
        assert_eq!(reply, MemoryReply::Status("enabled".to_string()));
        assert!(executor.memory().snapshot().enabled);
    }
}
