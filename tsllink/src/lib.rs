//! TSL Tally Tester link library (tsllink)
//!
//! This library moves encoded frames onto the network: the [`Transport`]
//! seam, its UDP implementation, and the dispatcher that keeps sends off the
//! caller's thread.

pub mod transport;
pub mod dispatch;

pub use transport::*;
pub use dispatch::*;
pub use tslcore::*;
