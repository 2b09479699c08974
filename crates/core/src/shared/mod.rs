pub mod config;
pub mod constants;
pub mod cropper;
pub mod error;
pub mod frame;
pub mod quad;
