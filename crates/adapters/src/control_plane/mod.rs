pub mod client;

pub use client::{ControlPlaneClient, ControlPlaneError};
