pub mod load;
pub mod migrate;

pub use load::load_world;
pub use migrate::migrate;
