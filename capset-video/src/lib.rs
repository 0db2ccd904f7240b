pub mod frame_extractor;

pub use frame_extractor::{ContextLogger, FrameExtractor, Timestamp};
