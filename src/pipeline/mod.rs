//! Pipeline stages for page-by-page extraction.
//!
//! Each submodule implements one step of turning a page into text.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ client ◀──▶ retry
//! (path)    (pdfium)   (base64)   (VLM)       (per-page FSM)
//! ```
//!
//! 1. [`input`]: validate the path and the `%PDF` magic bytes
//! 2. [`render`]: [`render::PageSource`] and its pdfium implementation
//! 3. [`encode`]: PNG-encode and base64-wrap the rendered page
//! 4. [`client`]: one chat-completions call, classified into an outcome;
//!    [`provider`] adapts an `edgequake-llm` provider to the same trait
//! 5. [`retry`]: bounded retry/backoff state machine around the client

pub mod client;
pub mod encode;
pub mod input;
pub mod provider;
pub mod render;
pub mod retry;
