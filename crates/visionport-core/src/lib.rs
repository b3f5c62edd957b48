pub mod artifact;
pub mod backend;
pub mod bindings;
pub mod constraints;
pub mod device;
pub mod error;
pub mod labels;
pub mod precision;
pub mod spec;
pub mod tensor;

pub use artifact::*;
pub use backend::*;
pub use bindings::*;
pub use constraints::*;
pub use device::*;
pub use error::*;
pub use labels::*;
pub use precision::*;
pub use spec::*;
pub use tensor::*;
