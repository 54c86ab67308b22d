pub mod jwt;
pub mod upload;

pub use upload::{UploadFile, UploadPolicy};
