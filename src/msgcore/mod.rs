//! Message core: the outbound priority queue and the inbound dispatcher.

pub mod message;
pub mod msg_manager;
pub mod priority;
pub mod queue_manager;

pub use message::{Message, MessageType, Route};
pub use msg_manager::{DispatchOutcome, DispatchStats, MsgManager, MSG_MANAGER};
pub use priority::{PrioritizedMessage, PriorityBuffer};
pub use queue_manager::{QueueManager, QueueStats, QUEUE_MANAGER};
