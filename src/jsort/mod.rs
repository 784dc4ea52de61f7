pub mod command;
pub mod core;
pub mod error;
pub mod frame;
pub mod key;
pub mod pipeline;


pub use self::command::*;
pub use self::core::*;
pub use self::error::*;
pub use self::frame::*;
pub use self::key::*;
pub use self::pipeline::*;
