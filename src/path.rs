//! Request classification: which resource does a path address?
//!
//! Storage paths have the shape `/{version}/{account}[/{container}[/{object}]]`
//! where the object name may itself contain slashes.  Classification only
//! counts segments; a path that does not fit the shape is simply not ours to
//! touch and must be forwarded unmodified.

use percent_encoding::percent_decode_str;

/// The resource a request addresses, with decoded path components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourcePath {
    /// `/{version}/{account}`
    Account { version: String, account: String },
    /// `/{version}/{account}/{container}`
    Container {
        version: String,
        account: String,
        container: String,
    },
    /// `/{version}/{account}/{container}/{object}` -- object may contain `/`.
    Object {
        version: String,
        account: String,
        container: String,
        object: String,
    },
}

impl ResourcePath {
    /// The version component, common to every classified path.
    pub fn version(&self) -> &str {
        match self {
            ResourcePath::Account { version, .. }
            | ResourcePath::Container { version, .. }
            | ResourcePath::Object { version, .. } => version,
        }
    }

    /// The account component, common to every classified path.
    pub fn account(&self) -> &str {
        match self {
            ResourcePath::Account { account, .. }
            | ResourcePath::Container { account, .. }
            | ResourcePath::Object { account, .. } => account,
        }
    }
}

/// Classify a raw request path.
///
/// Returns `None` when the path cannot be classified (too few segments, or
/// an empty version/account/container segment); such requests pass through
/// the gateway untouched.  A trailing slash after the container is treated
/// as addressing the container itself.
pub fn classify(path: &str) -> Option<ResourcePath> {
    let trimmed = path.strip_prefix('/')?;
    let mut parts = trimmed.splitn(4, '/');

    let version = decode(parts.next()?)?;
    let account = decode(parts.next()?)?;

    let container = match parts.next() {
        None => {
            return Some(ResourcePath::Account { version, account });
        }
        Some(c) => decode(c)?,
    };

    match parts.next() {
        None | Some("") => Some(ResourcePath::Container {
            version,
            account,
            container,
        }),
        Some(rest) => Some(ResourcePath::Object {
            version,
            account,
            container,
            object: percent_decode_str(rest).decode_utf8_lossy().into_owned(),
        }),
    }
}

/// Decode one path segment; empty segments make the path unclassifiable.
fn decode(segment: &str) -> Option<String> {
    if segment.is_empty() {
        return None;
    }
    Some(percent_decode_str(segment).decode_utf8_lossy().into_owned())
}

// -- Tests --------------------------------------------------------------------
