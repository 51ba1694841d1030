pub mod connection;
pub mod input;
pub mod renderer;

pub use connection::{ConnectionManager, ConnectionStatus, SyncEvent, topics};
pub use input::{InputEvent, InputForwarder, Modifiers};
pub use renderer::{CanvasRenderer, FrameDecoder, JpegPassthrough, RenderSurface, SharedFramebuffer};
