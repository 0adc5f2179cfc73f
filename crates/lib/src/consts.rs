//! Application-wide constants.

/// Name used for default directories and marker files.
pub const APP_NAME: &str = "cairn";

/// Number of hex characters kept from the SHA-256 digest for a [`ContentAddress`].
///
/// [`ContentAddress`]: crate::util::hash::ContentAddress
pub const ADDRESS_LEN: usize = 20;

/// Environment variable overriding the store root.
pub const STORE_ENV: &str = "CAIRN_STORE";

/// Marker file written inside a store entry once it is sealed.
pub const COMPLETE_MARKER: &str = ".cairn-complete";

/// Version of the completion marker format.
pub const MARKER_VERSION: u32 = 1;

/// Platform value accepted on every host.
pub const ANY_PLATFORM: &str = "any";

/// January 1, 1980 00:00:00 UTC (ZIP epoch), exported as `SOURCE_DATE_EPOCH`.
pub const SOURCE_DATE_EPOCH: &str = "315532800";
