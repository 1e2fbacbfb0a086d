#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod claim;
pub mod duration;
pub mod network;
pub mod range;
pub mod verdict;

pub use claim::{ResponderClaim, Uid};
pub use network::Network;
pub use range::{BlockNumber, BlockRange};
pub use verdict::Verdict;
