pub mod annotation;
pub mod snapshot;

pub use annotation::{ActivityKind, Annotation, PopupStyle};
pub use snapshot::{ActivitySignal, Batch, ScreenSnapshot};
