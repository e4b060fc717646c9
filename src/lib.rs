pub mod dates;
pub mod fetch;
pub mod ingest;
pub mod model;
pub mod weather;
