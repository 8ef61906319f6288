pub mod error;
pub mod models;
pub mod validation;
pub mod user_info;
pub mod window;
pub mod tally;

pub use error::{Error, ErrorCode, Result};
pub use models::*;
pub use validation::*;
pub use user_info::*;
pub use window::{Clock, ManualClock, SystemClock, format_remaining, MS_PER_MINUTE};
pub use tally::{compute_tally, CandidateCount, Tally};

#[cfg(test)]
mod tests;
