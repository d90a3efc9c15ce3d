pub mod http_logger;
pub mod tracker;

pub use http_logger::log_http;
pub use tracker::{track_request, RouteTracker};
