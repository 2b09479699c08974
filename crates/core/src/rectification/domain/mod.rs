pub mod image_rectifier;
