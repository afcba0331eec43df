//! Feed entry model and Bluesky post text composition.
//!
//! Everything in here is free of network I/O. The only outside dependency is
//! [`detect::HandleResolver`], which the caller implements on top of an API
//! session to turn `@handle` mentions into DIDs.

pub mod compose;
pub mod detect;
pub mod entry;
pub mod facet;
pub mod grapheme;

pub use self::compose::{ComposeError, ComposeResult, ComposedPost};
pub use self::entry::{FeedEntry, FeedLink};
pub use self::facet::{ByteSlice, Facet, FacetFeature};
