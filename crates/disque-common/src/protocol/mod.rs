pub mod command;
pub mod error;
pub mod reply;

#[cfg(test)]
mod tests;

pub use command::{Command, ToArg};
pub use error::{DisqueError, Result};
pub use reply::Reply;
