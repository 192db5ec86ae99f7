pub mod threaded_bridge;
