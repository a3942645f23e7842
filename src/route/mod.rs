pub mod link;
pub mod planner;

pub use link::{build_link, MapProvider, ORIGIN};
pub use planner::{Navigator, RouteBatch, RoutePlanner};
