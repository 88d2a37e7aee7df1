//! Claude (Anthropic) provider.
//!
//! ## Fetch Strategies
//!
//! 1. **OAuth** (`claude.oauth`): `api.anthropic.com/api/oauth/usage` with the
//!    token Claude Code stores in `~/.claude/.credentials.json`, the
//!    `CLAUDE_CODE_OAUTH_TOKEN` variable, or meterbar's keychain item
//! 2. **Web** (`claude.web`): the claude.ai usage endpoint of the first
//!    organization, authenticated by a manually supplied `sessionKey` cookie
//! 3. **CLI** (`claude.cli`): `claude usage` text output
//!
//! The OAuth and web responses share one shape: a five-hour session window,
//! a seven-day window (pace-capable) and model-specific seven-day windows.

mod descriptor;
pub(crate) mod parser;

pub use descriptor::claude_descriptor;
