#![allow(dead_code)]

pub mod collector;
pub mod fixtures;

pub use collector::{Event, FakeCollector, Frame, ISSUED_TOKEN, Login, Reply};
