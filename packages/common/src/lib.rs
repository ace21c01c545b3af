pub mod block;
pub mod error;
pub mod result;
pub mod source;

pub use block::*;
pub use error::*;
pub use result::*;
pub use source::*;
