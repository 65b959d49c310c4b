// redisun-common - RESP value model and wire codec shared by the client
//
// This crate holds no I/O: it turns byte streams into values and back.

pub mod decode;
pub mod encode;
pub mod error;
pub mod value;

// Re-export for convenience
pub use decode::*;
pub use encode::*;
pub use error::*;
pub use value::*;
