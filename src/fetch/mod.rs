// src/fetch/mod.rs
pub mod dates;
pub mod http;
pub mod tables;

pub use dates::get_cme_dates;
pub use http::HttpPage;
pub use tables::get_download;
