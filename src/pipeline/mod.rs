//! Pipeline stages for statement extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the two collaborators (documents and the model)
//! sit behind traits.
//!
//! ## Data Flow
//!
//! ```text
//! unlock ──▶ render ──▶ classify ──▶ encode ──▶ llm ──▶ repair ──▶ normalize
//! (lopdf)    (pdfium)   (file name)  (base64)   (VLM)   (JSON fix)  (amounts)
//! ```
//!
//! 1. [`unlock`]    : decrypt into `<stem>.temp.pdf`, owned by an RAII guard
//! 2. [`render`]    : rasterise every page at 2×
//! 3. [`reader`]    : the [`reader::StatementReader`] seam over 1 and 2
//! 4. [`classify`]  : file name → template; template + page count → paging
//! 5. [`encode`]    : PNG-encode and base64-wrap each page
//! 6. [`llm`]       : the [`llm::VisionModel`] seam plus retry/backoff
//! 7. [`extract`]   : per-page or single-batch calls
//! 8. [`repair`]    : fence stripping, truncation recovery, row parsing
//! 9. [`normalize`] : locale-formatted amounts → numbers

pub mod classify;
pub mod encode;
pub mod extract;
pub mod llm;
pub mod normalize;
pub mod reader;
pub mod render;
pub mod repair;
pub mod unlock;
