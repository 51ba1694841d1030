pub mod frame;
pub mod messages;

pub use frame::{Frame, FrameError, decode_frame};
pub use messages::{
    ClientMessage, CompletedNode, ExecutingNode, NavigateAction, PageInfo, ServerMessage,
    WorkflowStatus, button_name,
};
