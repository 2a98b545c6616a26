// Domain layer - Pure polar recording logic, no I/O
pub mod events;
pub mod filters;
pub mod history;
pub mod performance;
pub mod polar;
pub mod readings;
pub mod recording;
pub mod units;
