//! Wire types exchanged between the procwatch agent and the snapshot store.

mod payload;
mod process;
mod time;

pub use payload::*;
pub use process::*;
pub use time::*;
