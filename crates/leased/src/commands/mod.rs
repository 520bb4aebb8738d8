pub mod bootstrap;
pub mod daemons;
pub mod plan;
