//! Script entry points.

use std::fmt;

/// The two functions a script may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// `keyTransform(key) -> key'`
    Key,

    /// `valueTransform(mapping) -> mapping'`
    Value,
}

impl FunctionKind {
    /// Returns the top-level function name a script must define.
    pub const fn function_name(self) -> &'static str {
        match self {
            Self::Key => "keyTransform",
            Self::Value => "valueTransform",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_names() {
        assert_eq!(FunctionKind::Key.function_name(), "keyTransform");
        assert_eq!(FunctionKind::Value.to_string(), "valueTransform");
    }
}
