pub mod bodies;
pub mod board;
pub mod config;
pub mod histogram;
pub mod layout;
pub mod lifecycle;
pub mod shared_consts;
pub mod tally;
pub mod tuning;
