pub mod extractor;
pub mod fetch;
pub mod headless;
pub mod monitor;

pub use extractor::{HttpStructuredExtractor, NullExtractor, StructuredExtractor};
pub use monitor::{AddUrlOutcome, WebMonitor, DEFAULT_SCAN_INTERVAL_SECS};
