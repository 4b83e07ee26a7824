pub mod envelope;
pub mod errors;
pub mod filter;
pub mod model;
pub mod ql;
pub mod resolver;
pub mod token;

pub use envelope::*;
pub use errors::*;
pub use filter::*;
pub use model::*;
pub use ql::{QueryLanguage, QueryParser};
pub use resolver::resolve;
