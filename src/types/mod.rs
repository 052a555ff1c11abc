//! Public types for the Muninn API.

mod caller;
mod entry;
mod generate;
mod response;
mod validation;

pub use caller::{Caller, Tier};
pub use entry::{CacheEntry, ResourceCost};
pub use generate::GenerationOutput;
pub use response::{ErrorBody, Response, ResponseMetadata, Served, Source};
pub use validation::{OutputValidator, StructuralValidator, Validation};
