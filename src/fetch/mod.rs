//! HTTP access to share pages, API endpoints and direct file URLs.
//!
//! [`Fetcher`] wraps a pooled `reqwest` client with the browser identity the
//! hosting service expects, maps transport failures into
//! [`NetworkError`](crate::error::NetworkError), and streams response bodies to
//! disk while hashing them.
//!
//! # Example
//!
//! ```no_run
//! use mfbulk_core::fetch::Fetcher;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::new()?;
//! let page = fetcher.get_text("https://www.mediafire.com/file/abc123/a.zip/file").await?;
//! println!("{} bytes of markup", page.len());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;

pub use client::{Fetcher, HeadInfo, StreamedBody};
