use std::fmt;

/// Selects which key prefix a `KvStore` operates under (spec §4.1).
///
/// A test run gets its own namespace so it can flush without touching
/// production data; the prefix is part of every Redis key the adapter
/// touches, so the two namespaces never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace {
    Prod,
    Test,
    Custom(String),
}

impl Namespace {
    pub fn from_config(s: &str) -> Self {
        match s {
            "prod" => Namespace::Prod,
            "test" => Namespace::Test,
            other => Namespace::Custom(other.to_string()),
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            Namespace::Prod => "prod",
            Namespace::Test => "test",
            Namespace::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}
