//! Canonical keys for references.

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

/// Root-level keyword holding every schema pulled in through a reference.
pub const MOVED_SCHEMAS_KEY: &str = "x-moved-schemas";
/// Prefix of a reference that points into [`MOVED_SCHEMAS_KEY`].
pub const MOVED_SCHEMAS_PREFIX: &str = "#/x-moved-schemas/";

const FILE_SCHEME: &str = "file://";

/// Characters that may not appear verbatim in a URI fragment.
const FRAGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Canonical identifier of a referenced schema.
pub type SchemaKey = String;

/// Turn a reference into its canonical key.
///
/// The second element is `true` when the reference already points into the
/// moved-schemas registry. Equal keys denote the same logical schema. Keys are
/// percent-decoded, so `a%20b` and `a b` name the same schema.
pub fn key_for_reference(reference: &str) -> (SchemaKey, bool) {
    let reference = reference.strip_prefix(FILE_SCHEME).unwrap_or(reference);
    if let Some(key) = reference.strip_prefix(MOVED_SCHEMAS_PREFIX) {
        return (unescape_token(&decode(key)), true);
    }
    (decode(reference).replace('/', "-").replace('#', ""), false)
}

/// Build the reference that points at `key` inside the moved-schemas registry.
///
/// The key is percent-encoded where a URI fragment requires it.
pub fn moved_reference(key: &str) -> String {
    let token = escape_token(key);
    format!("{MOVED_SCHEMAS_PREFIX}{}", utf8_percent_encode(&token, FRAGMENT))
}

/// Whether `reference` already points into the moved-schemas registry.
pub fn is_moved_reference(reference: &str) -> bool {
    reference.starts_with(MOVED_SCHEMAS_PREFIX)
}

// Keys keep `~` from the original pointer, so it has to survive a round trip
// through a JSON Pointer segment.
fn escape_token(key: &str) -> String {
    key.replace('~', "~0")
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn decode(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}
