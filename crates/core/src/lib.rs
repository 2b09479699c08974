pub mod accumulation;
pub mod detection;
pub mod pipeline;
pub mod rectification;
pub mod shared;
pub mod source;
