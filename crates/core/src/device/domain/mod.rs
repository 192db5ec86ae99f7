pub mod remote_device;
