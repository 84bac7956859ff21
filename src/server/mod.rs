#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;
#[cfg(feature = "ascii")]
pub mod ascii;
#[cfg(feature = "binary")]
pub mod binary;

#[cfg(feature = "tcp-tls")]
pub mod tls;

mod service;

pub use service::{NewService, Service};
