//!
//! Request shaping between the browser client and the upstream completion API.
//!
//! `inbound` parses and sanitizes what the client sends; `outbound` composes the
//! payload the upstream API receives (identity preamble, trimmed history, model tier).
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod inbound;
pub mod outbound;

/* --- start of code -------------------------------------------------------------------------- */

pub use inbound::{InboundRequest, Message, RequestMeta, Role};
pub use outbound::{OutboundRequest, RequestComposer};
