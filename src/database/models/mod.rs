pub mod aggregation;
pub mod message;

pub use aggregation::{AggregatedData, ClientAggregations};
pub use message::{fields, Message, MessageStatus, MessageType, NewMessage, StoredMessage};
