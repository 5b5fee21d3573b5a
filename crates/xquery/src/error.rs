use std::fmt;
use std::sync::Arc;

use crate::consts::{ERR_NS, XMLDB_NS};

/// Broad classification of evaluation failures.
///
/// Every error aborts the running evaluation; the kind only tells the caller
/// which family of problem occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operand or result violates a type expectation.
    Type,
    /// A sequence has more or fewer items than permitted.
    Cardinality,
    /// Unresolved variable or function.
    UndefinedReference,
    /// Malformed index input or a broken internal invariant (missing context).
    Precondition,
    /// Any other dynamic failure (arithmetic, storage).
    Dynamic,
}

/// Error codes emitted by the engine.
///
/// The `EXQD*` codes live in the database namespace, all others are the
/// W3C codes from the xqt-errors namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FOAR0001, // divide by zero
    FOAR0002, // numeric overflow
    FORG0001, // invalid lexical form / cast failure
    FORG0003, // zero-or-one violated
    FORG0004, // one-or-more violated
    FORG0005, // exactly-one violated
    FORG0006, // invalid argument type / EBV undefined
    XPTY0004, // type error
    XPTY0019, // path step applied to atomic values
    XPDY0002, // context item undefined
    XPST0008, // undeclared variable
    XPST0017, // unknown function
    XQST0034, // duplicate function declaration
    XQDY0025, // duplicate attribute in constructed element
    EXQD0001, // predicate result without context chain
    EXQD0002, // empty full-text term list
    EXQD0003, // storage failure reported by the broker
}

impl ErrorCode {
    pub fn local(self) -> &'static str {
        use ErrorCode::*;
        match self {
            FOAR0001 => "FOAR0001",
            FOAR0002 => "FOAR0002",
            FORG0001 => "FORG0001",
            FORG0003 => "FORG0003",
            FORG0004 => "FORG0004",
            FORG0005 => "FORG0005",
            FORG0006 => "FORG0006",
            XPTY0004 => "XPTY0004",
            XPTY0019 => "XPTY0019",
            XPDY0002 => "XPDY0002",
            XPST0008 => "XPST0008",
            XPST0017 => "XPST0017",
            XQST0034 => "XQST0034",
            XQDY0025 => "XQDY0025",
            EXQD0001 => "EXQD0001",
            EXQD0002 => "EXQD0002",
            EXQD0003 => "EXQD0003",
        }
    }

    pub fn namespace(self) -> &'static str {
        match self {
            ErrorCode::EXQD0001 | ErrorCode::EXQD0002 | ErrorCode::EXQD0003 => XMLDB_NS,
            _ => ERR_NS,
        }
    }

    /// Kind an error with this code has unless stated otherwise.
    pub fn default_kind(self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            FORG0003 | FORG0004 | FORG0005 => ErrorKind::Cardinality,
            XPST0008 | XPST0017 => ErrorKind::UndefinedReference,
            EXQD0001 | EXQD0002 => ErrorKind::Precondition,
            FOAR0001 | FOAR0002 | XQST0034 | XQDY0025 | EXQD0003 => ErrorKind::Dynamic,
            FORG0001 | FORG0006 | XPTY0004 | XPTY0019 | XPDY0002 => ErrorKind::Type,
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        use ErrorCode::*;
        let local = s
            .strip_prefix("err:")
            .or_else(|| s.strip_prefix("xmldb:"))
            .unwrap_or(s);
        Some(match local {
            "FOAR0001" => FOAR0001,
            "FOAR0002" => FOAR0002,
            "FORG0001" => FORG0001,
            "FORG0003" => FORG0003,
            "FORG0004" => FORG0004,
            "FORG0005" => FORG0005,
            "FORG0006" => FORG0006,
            "XPTY0004" => XPTY0004,
            "XPTY0019" => XPTY0019,
            "XPDY0002" => XPDY0002,
            "XPST0008" => XPST0008,
            "XPST0017" => XPST0017,
            "XQST0034" => XQST0034,
            "XQDY0025" => XQDY0025,
            "EXQD0001" => EXQD0001,
            "EXQD0002" => EXQD0002,
            "EXQD0003" => EXQD0003,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace() == ERR_NS {
            write!(f, "err:{}", self.local())
        } else {
            write!(f, "xmldb:{}", self.local())
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self { kind: code.default_kind(), code, message: msg.into(), source: None }
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::XPTY0004, msg)
    }

    /// Cardinality violation reported under a type code (e.g. value
    /// comparison with a multi-item operand).
    pub fn cardinality(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::from_code(code, msg).with_kind(ErrorKind::Cardinality)
    }

    pub fn missing_context(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::XPDY0002, msg)
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::EXQD0003, msg)
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Compose an error with a source cause.
    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }

    /// Code rendered as `err:LOCAL` or `xmldb:LOCAL`.
    pub fn format_code(&self) -> String {
        self.code.to_string()
    }
}

impl From<fancy_regex::Error> for Error {
    fn from(e: fancy_regex::Error) -> Self {
        Error::from_code(ErrorCode::FORG0001, "invalid search pattern")
            .with_kind(ErrorKind::Precondition)
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip_and_kind() {
        let e = Error::from_code(ErrorCode::XPST0017, "unknown function local:f#1");
        assert_eq!(e.kind, ErrorKind::UndefinedReference);
        assert_eq!(e.format_code(), "err:XPST0017");
        assert_eq!(ErrorCode::from_code("err:XPST0017"), Some(ErrorCode::XPST0017));
        assert_eq!(ErrorCode::from_code("xmldb:EXQD0002"), Some(ErrorCode::EXQD0002));
        assert_eq!(ErrorCode::from_code("nope"), None);
    }

    #[test]
    fn cardinality_keeps_code() {
        let e = Error::cardinality(ErrorCode::XPTY0004, "more than one item");
        assert_eq!(e.code, ErrorCode::XPTY0004);
        assert_eq!(e.kind, ErrorKind::Cardinality);
        assert_eq!(e.to_string(), "err:XPTY0004: more than one item");
    }
}
