// Event system: topic pub/sub bus plus the dashboard fan-out relay.

pub mod bus;
pub mod fanout;

pub use bus::{EventBus, PipelineEvent};
pub use fanout::NotificationFanout;
