pub mod client;
pub mod completion;
pub mod config;
pub mod controller;
pub mod demographics;
pub mod error;
pub mod task;

pub use client::BalancerClient;
pub use controller::{DeviceInfo, SessionController, Stage};
