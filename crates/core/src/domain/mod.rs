pub mod consensus;
pub mod distribution;
pub mod payload;
pub mod period;
pub mod rating;
pub mod report;
pub mod tally;
pub mod transition;
