pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod nodes;
pub mod state;
