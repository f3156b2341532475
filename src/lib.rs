#![forbid(unsafe_code)]

pub mod basis;
pub mod errors;
pub mod imports;
pub mod model;
pub mod processors;
pub mod resolver;
pub mod util;
