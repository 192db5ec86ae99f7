pub mod rectangle_marker;
