pub mod detection;
pub mod errors;
pub mod frame;
pub mod keywords;
pub mod media;
pub mod model;
pub mod stream;
