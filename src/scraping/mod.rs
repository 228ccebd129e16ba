pub mod browser_manager;
pub mod chromium_page;
pub mod interaction;
pub mod page;

pub use interaction::{PageInteractor, RetryPolicy};
pub use page::{Locator, Nth, PageDriver};
