pub mod http_remote_device;
