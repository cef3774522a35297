pub mod burst;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod headers;
pub mod logger;
pub mod reporter;
pub mod rotator;
pub mod sender;
pub mod sweep;
pub mod types;
pub mod warmer;
pub mod window;

/// Claim endpoint (POST, JSON body `{walletAddress, hour}`).
pub const DEFAULT_CLAIM_URL: &str = "https://www.itstheseason.christmas/api/advent/claim";

/// Service root, hit with cheap GETs to warm DNS/TCP/TLS before a burst.
pub const DEFAULT_WARMUP_URL: &str = "https://www.itstheseason.christmas/";

/// Origin sent in `origin`/`referer` headers.
pub const DEFAULT_ORIGIN: &str = "https://www.itstheseason.christmas";

/// Body substring the server returns on a genuine claim.
pub const CLAIM_SUCCESS_MARKER: &str = "Successfully claimed";
