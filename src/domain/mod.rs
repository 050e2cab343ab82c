pub mod diff;
pub mod model;
pub mod normalize;
pub mod validate;
