pub mod body;
pub mod fixture;
pub mod joints;
pub mod shapes;
pub mod types;
