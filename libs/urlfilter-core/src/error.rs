use http::StatusCode;
use thiserror::Error;

use crate::filter::Operator;
use crate::problem::{ErrDef, Problem};

/// Compilation errors. Every variant aborts the request; there is no
/// partial predicate and no unfiltered fallback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("cannot resolve `{path}`: {reason}")]
    SchemaResolution { path: String, reason: String },

    #[error("invalid value `{value}` for `{field}`: expected {expected}")]
    ValueCoercion {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("operator `{operator}` is not supported on `{field}`: {reason}")]
    UnsupportedOperator {
        field: String,
        operator: Operator,
        reason: &'static str,
    },

    #[error("invalid embedded graph `{graph}`: {reason}")]
    GraphResolution { graph: String, reason: String },

    #[error("unknown access rule: {0}")]
    UnknownAccessRule(String),

    #[error("access rule `{0}` requires an authenticated principal")]
    MissingPrincipal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors of the search entry point: compilation plus storage.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Filter(#[from] Error),

    #[error("storage failure: {0:#}")]
    Storage(#[source] anyhow::Error),
}

/* ---------- catalog ---------- */

pub const SCHEMA_RESOLUTION: ErrDef = ErrDef {
    status: 400,
    title: "Unknown Filter Field",
    code: "FILTER_SCHEMA_RESOLUTION",
    type_url: "https://errors.urlfilter.dev/FILTER_SCHEMA_RESOLUTION",
};

pub const VALUE_COERCION: ErrDef = ErrDef {
    status: 400,
    title: "Invalid Filter Value",
    code: "FILTER_VALUE_COERCION",
    type_url: "https://errors.urlfilter.dev/FILTER_VALUE_COERCION",
};

pub const UNSUPPORTED_OPERATOR: ErrDef = ErrDef {
    status: 400,
    title: "Unsupported Filter Operator",
    code: "FILTER_UNSUPPORTED_OPERATOR",
    type_url: "https://errors.urlfilter.dev/FILTER_UNSUPPORTED_OPERATOR",
};

pub const GRAPH_RESOLUTION: ErrDef = ErrDef {
    status: 400,
    title: "Invalid Embedded Graph",
    code: "FILTER_GRAPH_RESOLUTION",
    type_url: "https://errors.urlfilter.dev/FILTER_GRAPH_RESOLUTION",
};

pub const MISSING_PRINCIPAL: ErrDef = ErrDef {
    status: 401,
    title: "Unauthorized",
    code: "ACCESS_MISSING_PRINCIPAL",
    type_url: "https://errors.urlfilter.dev/ACCESS_MISSING_PRINCIPAL",
};

pub const UNKNOWN_ACCESS_RULE: ErrDef = ErrDef {
    status: 500,
    title: "Access Rule Misconfigured",
    code: "ACCESS_UNKNOWN_RULE",
    type_url: "https://errors.urlfilter.dev/ACCESS_UNKNOWN_RULE",
};

pub const STORAGE: ErrDef = ErrDef {
    status: 500,
    title: "Internal Server Error",
    code: "SEARCH_STORAGE",
    type_url: "https://errors.urlfilter.dev/SEARCH_STORAGE",
};

impl Error {
    pub fn err_def(&self) -> &'static ErrDef {
        match self {
            Error::SchemaResolution { .. } => &SCHEMA_RESOLUTION,
            Error::ValueCoercion { .. } => &VALUE_COERCION,
            Error::UnsupportedOperator { .. } => &UNSUPPORTED_OPERATOR,
            Error::GraphResolution { .. } => &GRAPH_RESOLUTION,
            Error::MissingPrincipal(_) => &MISSING_PRINCIPAL,
            Error::UnknownAccessRule(_) => &UNKNOWN_ACCESS_RULE,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.err_def().status_code()
    }

    /// True when the request itself is at fault (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl SearchError {
    pub fn err_def(&self) -> &'static ErrDef {
        match self {
            SearchError::Filter(e) => e.err_def(),
            SearchError::Storage(_) => &STORAGE,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.err_def().status_code()
    }

    /// RFC 9457 rendering. Server-side failures do not leak their detail.
    pub fn to_problem(&self, instance: &str) -> Problem {
        let def = self.err_def();
        let detail = if def.status_code().is_server_error() {
            def.title.to_string()
        } else {
            self.to_string()
        };
        def.to_problem(detail).with_instance(instance)
    }
}
