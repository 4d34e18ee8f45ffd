//! Browser lifecycle: launching, exclusive ownership, guaranteed release

mod wrapper;

pub use wrapper::BrowserWrapper;
