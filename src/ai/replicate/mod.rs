pub mod client;
pub mod image;
pub mod types;

pub use client::ReplicateHttpClient;
pub use image::ReplicateImageClient;
pub use types::ModelRef;
