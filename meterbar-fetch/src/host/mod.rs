//! Host collaborators for fetch strategies.
//!
//! Each collaborator is a narrow trait with one system implementation:
//!
//! - [`keychain`] - Secret lookup (system keychain)
//! - [`process`] - Subprocess execution for CLI tools
//! - [`http`] - HTTP client with tracing and domain allowlist
//! - [`cookies`] - Cached cookie headers

pub mod cookies;
pub mod http;
pub mod keychain;
pub mod process;

pub use cookies::{CachedCookie, CookieCache, JsonCookieCache};
pub use http::{HttpApi, HttpClient, HttpMethod, HttpRequest, HttpResponse, UnconfiguredHttp};
pub use keychain::{CredentialStore, SystemKeychain};
pub use process::{CliRunner, ProcessOutput, ProcessRunner};
