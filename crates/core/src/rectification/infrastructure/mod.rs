pub mod perspective_rectifier;
