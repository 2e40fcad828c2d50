//! Cadence Core
//!
//! Platform-agnostic core types and collaborator traits for the Cadence
//! playback session.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `Track`, `TrackId`
//! - **Collaborator Traits**: `Renderer`, `FocusHost`, `KeyValueStore`, `TrackLibrary`
//! - **Error Handling**: Unified `CoreError` and `Result` types
//!
//! Everything that touches a platform (audio output, the OS focus manager,
//! storage engines, the media library) lives behind one of these traits so the
//! playback session can be driven and tested without any of them.
//!
//! # Example
//!
//! ```rust
//! use cadence_core::{Track, TrackId};
//!
//! let track = Track::new(TrackId::new("a"), "Intro", 180_000)
//!     .with_artist("Artist")
//!     .with_source_ref("/music/intro.flac");
//!
//! assert_eq!(track.duration_ms, 180_000);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use traits::{
    FocusChange, FocusHost, FocusResponse, KeyValueStore, Renderer, RendererEvent, TrackLibrary,
};
pub use types::{Track, TrackId};
