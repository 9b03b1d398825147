//! DTOs compartidos por los endpoints

pub mod api_response;

pub use api_response::ApiResponse;
