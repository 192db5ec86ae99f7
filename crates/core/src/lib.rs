pub mod annotation;
pub mod detection;
pub mod device;
pub mod pipeline;
pub mod server;
pub mod shared;
pub mod video;
