// Core modules implementing CSV loading, coercion, and error modeling.
pub mod dates;
pub mod error;
pub mod loader;
pub mod schema;
