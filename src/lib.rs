pub mod cli;
pub mod collect;
pub mod error;
pub mod model;
pub mod output;
pub mod privilege;
pub mod probe;
pub mod process;
pub mod system;
