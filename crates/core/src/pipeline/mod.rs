pub mod acquisition_loop;
pub mod cycle_logger;
pub mod frame_slot;
pub mod infrastructure;
pub mod ingestion_handler;
pub mod processing_loop;
