pub mod broadcast;
pub mod controller;
pub mod driver;

pub use broadcast::{Broadcaster, PublishReport, Subscription, SubscriptionId};
pub use controller::{CaptureLoopConfig, PipelineController};
pub use driver::{DriverConfig, PipelineDriver, TickOutcome};
