use std::env;
use std::error;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("value of {0:?} environment variable is not valid UTF-8")]
    NotUtf8(String),

    #[error("couldn't parse {value:?} from {name:?} environment variable: {inner}")]
    ParsingFailed {
        name: String,
        value: String,
        #[source]
        inner: Box<dyn error::Error + Send + Sync>,
    },
}

/// Reads and parses an environment variable, `Ok(None)` if it is unset or empty.
pub fn parse_env_var<T: FromStr>(name: &str) -> Result<Option<T>, Error>
where
    T::Err: error::Error + Send + Sync + 'static,
{
    let Some(value) = env::var_os(name) else {
        return Ok(None);
    };
    let value = value
        .into_string()
        .map_err(|_| Error::NotUtf8(name.to_string()))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|err| Error::ParsingFailed {
            name: name.to_string(),
            value: trimmed.to_string(),
            inner: Box::new(err),
        })
}

pub fn parse_env_var_or<T: FromStr>(name: &str, default: T) -> Result<T, Error>
where
    T::Err: error::Error + Send + Sync + 'static,
{
    Ok(parse_env_var(name)?.unwrap_or(default))
}
