pub mod adapter;
pub mod locator;
pub mod placement;
