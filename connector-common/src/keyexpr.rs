/// Root of every connector's key expressions.
pub const KEY_PREFIX: &str = "timeseries";

/// Builder for measurement key expressions.
///
/// Key expressions follow the pattern:
/// `<prefix>/<source>/<point_path>`
#[derive(Debug, Clone)]
pub struct KeyExprBuilder {
    prefix: String,
}

impl KeyExprBuilder {
    /// Create a builder with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let prefix: String = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Build a key expression for a specific source and point.
    ///
    /// # Example
    /// ```
    /// use connector_common::keyexpr::KeyExprBuilder;
    ///
    /// let builder = KeyExprBuilder::with_prefix("timeseries/modbus");
    /// let key = builder.build("meter01", "1/100");
    /// assert_eq!(key, "timeseries/modbus/meter01/1/100");
    /// ```
    pub fn build(&self, source: &str, point: &str) -> String {
        format!("{}/{}/{}", self.prefix, source, point)
    }

    /// Build the key expression for connector status.
    pub fn status_key(&self) -> String {
        format!("{}/@/status", self.prefix)
    }
}
