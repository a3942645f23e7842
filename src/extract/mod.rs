pub mod normalize;
pub mod patterns;

pub use normalize::normalize;
pub use patterns::extract_addresses;
