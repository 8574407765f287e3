//! Statement-layer options.

use url::Url;

use crate::error::Error;

/// Options for the prepared-statement layer of a connection.
///
/// Connection parameters such as host, user and TLS mode belong to the
/// handshake and are ignored here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Opts {
    /// Maximum number of rows fetched per Execute round trip.
    ///
    /// `0` fetches the whole result in the first round trip. Any other value
    /// keeps the portal open between batches and lets the result set pull the
    /// remaining rows on demand.
    ///
    /// Default: `0`
    pub fetch_size: u32,
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Read statement options from a PostgreSQL connection URL.
    ///
    /// Format: `postgres://[user[:password]@]host[:port][/database][?fetch_size=N&..]`
    ///
    /// Supported query parameters:
    /// - `fetch_size`: rows per Execute round trip (non-negative integer)
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if !["postgres", "pg"].contains(&url.scheme()) {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'postgres://' or 'pg://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts::default();

        for (key, value) in url.query_pairs() {
            if key == "fetch_size" {
                opts.fetch_size = value.parse().map_err(|_| {
                    Error::InvalidUsage(format!("Invalid fetch_size: {}", value))
                })?;
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}
