pub mod auto_placement;
pub mod bootstrap;
pub mod commands;
pub mod interaction;
pub mod planners;
pub mod schedule_store;
