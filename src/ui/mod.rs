pub mod icons;
pub mod output;
pub mod progress;

pub use output::{ChannelKind, Channels, OutputSink, Transcript};
pub use progress::SessionUI;
