pub mod intent;
pub mod realtime;
pub mod tools;

// Re-export commonly used types for convenience
pub use intent::{CarouselDirection, DeviceState, Intent, InterceptRule, classify};

pub use realtime::{
    GeminiLive, GeminiLiveConfig, LiveConnector, RealtimeError, RealtimeResult, SessionGuard,
    SessionSetup, SessionState, UpstreamSender, UpstreamSession,
};

pub use tools::{
    ChartKind, ChartRenderer, LocalToolExecutor, RasterRenderer, RenderError, ToolResult,
    WeatherConfig,
};
