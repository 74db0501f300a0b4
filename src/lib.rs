pub mod camera;
pub mod term;
