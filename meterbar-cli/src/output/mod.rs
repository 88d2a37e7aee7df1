//! Output formatting for the CLI.

mod display;
mod json;
mod text;

pub use display::DisplayMode;
pub use json::JsonFormatter;
pub use text::TextFormatter;
