pub mod deadline;
pub mod mock;

pub use deadline::DeadlineGenerator;
pub use mock::{MockGenerator, MockResponse};
