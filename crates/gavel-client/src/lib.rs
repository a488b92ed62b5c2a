pub mod intercept;
pub mod session;
pub mod sites;

pub use intercept::NetworkTap;
pub use session::{BrowserDriver, BrowserPage, BrowserSession};
pub use sites::{CrexiStrategy, LoopNetStrategy, RmiStrategy};
