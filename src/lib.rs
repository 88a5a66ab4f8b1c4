#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod auth;
pub mod banner;
pub mod cipher;
pub mod config;
pub mod error;
pub mod framer;
pub mod hostkey;
pub mod kex;
pub mod keys;
pub mod mac;
pub mod message;
pub mod provider;
pub mod session;
pub mod transport;
pub mod user;
pub mod wire;

pub use config::Config;
pub use error::{Error, Result};
pub use message::Message;
pub use session::Session;
