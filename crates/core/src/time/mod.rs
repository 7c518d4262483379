pub mod in_market;

pub use in_market::MarketCalendar;
