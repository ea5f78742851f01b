use std::env;

use crate::error::Error;

pub const BATCH_SIZE_VAR: &str = "SQLX_QUERY_MAPPER_BATCH_SIZE";
pub const FETCH_SIZE_VAR: &str = "SQLX_QUERY_MAPPER_FETCH_SIZE";

/// Defaults applied to query declarations that do not set their own.
///
/// A batch size of zero or less executes batch entries one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Settings {
    pub batch_size: i32,
    pub fetch_size: Option<u32>,
}

impl Settings {
    /// Reads overrides from `SQLX_QUERY_MAPPER_BATCH_SIZE` and
    /// `SQLX_QUERY_MAPPER_FETCH_SIZE`, keeping the defaults for unset
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but is not a number.
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        let mut settings = Settings::default();
        if let Some(raw) = lookup(BATCH_SIZE_VAR) {
            settings.batch_size = raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{BATCH_SIZE_VAR}={raw}")))?;
        }
        if let Some(raw) = lookup(FETCH_SIZE_VAR) {
            let rows = raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{FETCH_SIZE_VAR}={raw}")))?;
            settings.fetch_size = Some(rows);
        }
        Ok(settings)
    }
}
