pub mod domain;
pub mod error;
pub mod multiplex;
pub mod ports;

pub use domain::*;
pub use error::{Error, Result};
pub use multiplex::{MultiSampleChat, SamplingPolicy};
