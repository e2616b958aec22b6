//! Authenticated HTTP client core for the CMS API.
//!
//! # Overview
//! Issues requests against the CMS REST API, attaching the stored bearer
//! token and running a single refresh-and-retry cycle when a protected
//! endpoint answers 401. Public endpoints degrade to an ordinary error
//! instead of logging the visitor out.
//!
//! # Design
//! - `ApiClient` is generic over three seams: `Transport` (network I/O),
//!   `SessionStore` (persistent credentials) and `Navigator` (login
//!   redirect). Tests plug in scripted implementations of each.
//! - The 401 branches live in `flow::decide`, a pure function, so the state
//!   machine is testable without a transport.
//! - Requests and responses are plain data (`http`), the same values the
//!   transport receives and returns.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod error;
pub mod flow;
pub mod http;
pub mod navigator;
pub mod policy;
pub mod session;
pub mod transport;
pub mod types;

pub use client::{ApiClient, RequestOptions};
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, ErrorBody, ErrorKind};
pub use flow::{AuthDecision, RequestState};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use navigator::{FnNavigator, Navigator, NoopNavigator, RecordingNavigator};
pub use policy::PublicEndpoints;
pub use session::{FileSessionStore, MemorySessionStore, SessionError, SessionStore};
pub use transport::{Transport, TransportError, UreqTransport};
pub use types::{LoginRequest, LoginResponse, RefreshRequest, TokenPair};
