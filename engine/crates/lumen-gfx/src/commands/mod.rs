pub mod barrier;
pub mod command;
