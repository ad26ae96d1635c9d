pub mod frame;

pub use frame::{ColorSample, FramePattern, FrameReference};
