#![deny(unused_variables)]

pub mod config;
pub mod error;
pub mod locale;
pub mod text;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
