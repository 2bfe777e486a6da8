pub mod driver;
pub mod state;

pub use driver::{CrawlDriver, CrawlReport};
pub use state::{CrawlState, DriverState};
