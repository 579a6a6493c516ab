mod paths;
mod tailfile;

pub use paths::*;
pub use tailfile::*;
