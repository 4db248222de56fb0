//! Tools module containing tool abstractions and the four built-in tools

pub mod calculator;
pub mod file;
pub mod time;
pub mod tool;
pub mod web;

pub use calculator::CalculatorTool;
pub use file::FileTool;
pub use time::{Clock, FixedClock, SystemClock, TimeTool};
pub use tool::{Tool, ToolRegistry};
pub use web::WebTool;
