//! Target assignment, loss and decoding of the TTFNet detection head.

mod common;
pub mod area;
pub mod base_location;
pub mod config;
pub mod decode;
pub mod gaussian;
pub mod head;
pub mod layout;
pub mod loss;
pub mod meta;
pub mod target;

pub use area::*;
pub use base_location::*;
pub use config::*;
pub use decode::*;
pub use head::*;
pub use layout::*;
pub use loss::*;
pub use meta::*;
pub use target::*;
