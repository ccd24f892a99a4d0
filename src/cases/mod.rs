pub mod loader;
pub mod schema;

pub use loader::{discover_case_files, load_case_file, load_cases, CaseLoadError, CaseLoadResult};
pub use schema::{CleanupOptions, TestCase};
