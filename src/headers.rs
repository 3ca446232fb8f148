//! Header names and metadata conventions shared by the guards and upstreams.
//!
//! The storage service persists arbitrary `X-Account-Meta-*` and
//! `X-Object-Meta-*` headers as resource metadata and honors matching
//! `X-Remove-*` headers by deleting the named entry.  The recycle mechanism
//! is built entirely out of these, plus the service's native delayed-expiry
//! directive (`X-Delete-At` / `X-Delete-After`).

use http::HeaderMap;

/// The only value that turns a mark header into an actual mark.
pub const MARK_VALUE: &str = "yes";

// -- Account headers ----------------------------------------------------------

/// Client-facing mark header for accounts.
pub const ACCOUNT_RECYCLED: &str = "x-account-meta-recycled";

/// Bookkeeping timestamp (epoch seconds) written when the mark is set.
pub const ACCOUNT_RECYCLED_AT: &str = "x-account-meta-recycled-at";

/// Computed deadline echoed on masked responses; never stored.
pub const ACCOUNT_EARLIEST_DELETE_DATE: &str = "x-account-meta-earliest-delete-date";

/// Client-facing unmark header for accounts.
pub const ACCOUNT_REMOVE_RECYCLED: &str = "x-remove-account-meta-recycled";

/// Removal counterpart of [`ACCOUNT_RECYCLED_AT`], injected on unmark.
pub const ACCOUNT_REMOVE_RECYCLED_AT: &str = "x-remove-account-meta-recycled-at";

/// Legacy spelling of the stored deadline; reserved so clients cannot forge it.
pub const ACCOUNT_REMOVE_EARLIEST_DELETE_DATE: &str =
    "x-remove-account-meta-earliest-delete-date";

// -- Object headers -----------------------------------------------------------

/// Client-facing mark header for objects.
pub const OBJECT_RECYCLED: &str = "x-object-meta-recycled";

/// Bookkeeping timestamp (epoch seconds) written when the mark is set.
pub const OBJECT_RECYCLED_AT: &str = "x-object-meta-recycled-at";

/// Computed deadline echoed on masked responses; never stored.
pub const OBJECT_DELETE_DATE: &str = "x-object-meta-delete-date";

/// Client-facing unmark header for objects.
pub const OBJECT_REMOVE_RECYCLED: &str = "x-remove-object-meta-recycled";

/// Removal counterpart of [`OBJECT_RECYCLED_AT`], injected on unmark.
pub const OBJECT_REMOVE_RECYCLED_AT: &str = "x-remove-object-meta-recycled-at";

/// Reserved so clients cannot forge a stored delete date.
pub const OBJECT_REMOVE_DELETE_DATE: &str = "x-remove-object-meta-delete-date";

// -- Native expiry directive --------------------------------------------------

/// Absolute-epoch expiry directive understood by the storage service.
pub const DELETE_AT: &str = "x-delete-at";

/// Relative-seconds expiry directive understood by the storage service.
pub const DELETE_AFTER: &str = "x-delete-after";

/// Cancels a pending [`DELETE_AT`].
pub const REMOVE_DELETE_AT: &str = "x-remove-delete-at";

/// Cancels a pending [`DELETE_AFTER`].
pub const REMOVE_DELETE_AFTER: &str = "x-remove-delete-after";

// -- Gateway headers ----------------------------------------------------------

/// Swift-style transaction ID attached to every response.
pub const TRANS_ID: &str = "x-trans-id";

// -- Metadata key prefixes ----------------------------------------------------

/// Prefix under which account metadata travels on the wire.
pub const ACCOUNT_META_PREFIX: &str = "x-account-meta-";

/// Prefix under which object metadata travels on the wire.
pub const OBJECT_META_PREFIX: &str = "x-object-meta-";

/// Prefix that deletes account metadata entries.
pub const ACCOUNT_REMOVE_META_PREFIX: &str = "x-remove-account-meta-";

/// Prefix that deletes object metadata entries.
pub const OBJECT_REMOVE_META_PREFIX: &str = "x-remove-object-meta-";

// -- Helpers ------------------------------------------------------------------

/// Strip a metadata prefix from a lowercase header name.
///
/// `meta_key("x-account-meta-recycled", ACCOUNT_META_PREFIX)` yields
/// `Some("recycled")`; names outside the prefix yield `None`.
pub fn meta_key<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = name.strip_prefix(prefix)?;
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Read a header as a UTF-8 string, trimmed. Non-UTF-8 values read as absent.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

// -- Tests --------------------------------------------------------------------
