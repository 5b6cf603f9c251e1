// relays averaged spectrum frames from an acquisition queue to a single TCP client

pub mod app_config;
pub mod averager;
pub mod client;
pub mod codec;
pub mod control;
pub mod error;
pub mod messages;
pub mod monitor;
pub mod peaks;
pub mod psd;
pub mod queue;
pub mod relay;

pub use error::{Error, Result};
