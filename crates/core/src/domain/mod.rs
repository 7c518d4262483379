pub mod fundamentals;
pub mod indicators;
pub mod market;
pub mod recommendation;
pub mod record;
pub mod risk;
pub mod scoring;
