pub mod normalize;
pub mod provider;
pub mod stub;
pub mod types;
pub mod yahoo;
