//! Donut SMP API integration module
//!
//! - `http`: HTTP adapter (status + body, or transport failure)
//! - `client`: endpoint URLs and request headers
//! - `validator`: credential validation (lookup endpoint)
//! - `fetcher`: stats + lookup fetch and merge

pub mod client;
pub mod http;
mod fetcher;
mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use client::DonutClient;
pub use http::{HttpGet, HttpResponse, ReqwestHttp};
