pub mod discovery;
pub mod line_channel;
