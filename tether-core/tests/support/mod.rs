#![allow(dead_code)]
mod fake_driver;

pub use fake_driver::*;
