#![allow(dead_code)]

pub mod mediafire;

#[path = "../../src/test_support/socket_guard.rs"]
pub mod socket_guard;
