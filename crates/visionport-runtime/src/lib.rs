pub mod decode;
pub mod pipeline;
pub mod preprocess;

pub use decode::*;
pub use pipeline::*;
pub use preprocess::*;
