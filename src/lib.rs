#![doc = include_str!("../README.md")]

mod bits;
mod error;
mod page;
mod receiver;

pub mod encode;
pub mod message;
pub mod reed_solomon;

pub use error::{Error, Result};
pub use page::{HasPage, PAGE_BITS, PAGE_OCTETS};
pub use receiver::{HasMsgReceiver, NavMessagePacket};
