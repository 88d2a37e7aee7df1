//! Codex (`OpenAI`) provider.
//!
//! ## Fetch Strategies
//!
//! 1. **OAuth** (`codex.oauth`): `ChatGPT` backend usage endpoint, bearer
//!    token from `~/.codex/auth.json`
//! 2. **CLI** (`codex.cli`): `codex usage --json`
//!
//! The weekly window is the secondary window and supports pace.

mod descriptor;
pub(crate) mod parser;

pub use descriptor::codex_descriptor;
