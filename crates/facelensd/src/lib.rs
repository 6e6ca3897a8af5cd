//! facelensd — live face recognition over a camera feed.
//!
//! Startup runs in dependency order: the four models load concurrently, then
//! the camera is acquired while the labeled reference set is built, and the
//! recognition loop starts once the video feed reports ready. Everything the
//! loop needs is owned by one [`Session`](session::Session).

pub mod capture;
pub mod config;
pub mod engine;
pub mod live;
pub mod loader;
pub mod overlay;
pub mod reference;
pub mod session;
pub mod video;
