pub mod infrastructure;
pub mod processing_service;
pub mod scan_logger;
