pub mod buffer;
pub mod capture;
pub mod loop_worker;
pub mod ocr;
pub mod phash;

pub use buffer::EventBuffer;
pub use capture::{CommandCapture, ScreenCapture};
pub use loop_worker::capture_loop;
pub use ocr::{ScriptOcr, TextExtractor};
