//! Webhook dispatch of approved blueprints.
//!
//! The production system's ingest endpoint is idempotent keyed by the
//! `Idempotency-Key` header, so this crate only guarantees at-least-once
//! delivery with bounded retries; it never re-generates the key within a
//! single approval attempt.

mod correlation;
mod dispatcher;
mod error;

pub use correlation::{generate_correlation_id, generate_idempotency_key, sign_payload};
pub use dispatcher::{Dispatch, DispatchAck, DispatchConfig, WebhookDispatcher};
pub use error::{DispatchError, DispatchResult};
