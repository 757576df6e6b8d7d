#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod artifact;
pub mod chunking;
pub mod config;
pub mod error;
pub mod tabular;
pub mod traits;
pub mod transform;
pub mod types;

pub use error::{Error, Result};
