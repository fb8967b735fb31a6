pub mod request;
pub mod response;
pub mod routes;
pub mod tenant;

pub use response::ApiError;
pub use routes::{create_router, AppState};
