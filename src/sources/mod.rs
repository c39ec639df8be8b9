//! Upstream media listing
//!
//! [`CommonsListingClient`] talks to the Commons API one page at a time and
//! [`Pager`] turns those pages into a flat, bounded sequence of image URLs.

pub mod commons;
pub mod pager;
pub mod traits;

pub use commons::CommonsListingClient;
pub use pager::Pager;
pub use traits::{ListingClient, ListingPage, PageCursor, PageRequest};
