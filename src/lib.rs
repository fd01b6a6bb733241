pub mod controller;
pub mod energy;
pub mod error;
pub mod net;
pub mod sim;
pub mod topo;
pub mod units;

pub use error::{NetError, Result};

#[cfg(test)]
mod test;
