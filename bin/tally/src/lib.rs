pub mod cli;
mod signal;
