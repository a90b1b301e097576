//! TSL Tally Tester shared library (tslcore)
//!
//! This library contains the definitions shared by the link layer (tsllink)
//! and the tester (tsltester): the TSL 3.1 frame codec, the tally bank, and
//! the snapshot types used for saving and loading.

pub mod types;
pub mod protocol;
pub mod bank;
pub mod snapshot;
pub mod error;

pub use types::*;
pub use protocol::*;
pub use bank::*;
pub use snapshot::*;
pub use error::*;
