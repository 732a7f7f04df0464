//! Live voice/text WebSocket handlers
//!
//! One client connection is relayed to one upstream Gemini Live session.
//! Text that matches a local intent is answered here and never reaches the
//! model.
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **first message**: configuration, read and ignored
//! - **realtime_input**: `{"media_chunks": [{"mime_type", "data"}]}`, forwarded upstream
//! - **text**: free text, intercepted or forwarded as a user turn
//! - **memory**: `enable`, `disable`, `clear`, `status`, `set_preference`, `get_preference`
//!
//! ## Server → Client
//!
//! - **text**, **audio**, **transcription**, **interrupted**
//! - **carousel**, **button**
//! - **wordcloud**, **barchart**, **linechart**, **piechart** (base64 PNG)
//! - **memory_status**, **memory_value**

mod handler;
pub mod messages;
mod relay;
mod translate;

pub use handler::{CLOSE_UPSTREAM_FAILED, live_handler};
pub use relay::LiveRelay;
pub use translate::{UpstreamAction, translate};
