pub mod sweep;
pub mod status;
pub mod errors;

pub use sweep::*;
pub use status::*;
pub use errors::*;
