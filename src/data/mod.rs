//! Data acquisition: provider abstraction, retrying collection, request
//! validation, and the offline sample provider.

pub mod sample;
pub mod serpapi;
pub mod source;
pub mod validate;

pub use sample::SampleSource;
pub use serpapi::SerpApiSource;
pub use source::*;
pub use validate::*;
