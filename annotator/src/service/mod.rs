pub mod client;

pub use client::{RecognitionClient, Recognized};
