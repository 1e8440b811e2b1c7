//! Configuration parsing for keymux
//!
//! This crate handles parsing KDL configuration files into the remap
//! rule tables consumed by the daemon.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{parse_config, parse_config_str};
