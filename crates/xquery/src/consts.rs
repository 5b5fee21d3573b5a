//! Well-known namespace URIs and prefixes.

pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const FNS: &str = "http://www.w3.org/2005/xpath-functions";
pub const LOCAL_NS: &str = "http://www.w3.org/2005/xquery-local-functions";
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";

/// Namespace of the database specific functions and pragmas.
pub const XMLDB_NS: &str = "http://xmldb.org/ns/query";
/// Namespace of the full-text helper functions (`text:*`).
pub const TEXT_NS: &str = "http://xmldb.org/ns/query/text";

/// Prefix bindings every static context starts with.
pub const DEFAULT_PREFIXES: &[(&str, &str)] = &[
    ("xml", XML_URI),
    ("xs", XS),
    ("xsi", XSI),
    ("fn", FNS),
    ("local", LOCAL_NS),
    ("err", ERR_NS),
    ("xmldb", XMLDB_NS),
    ("text", TEXT_NS),
];
