use std::{error, fmt, result};

pub type BoxedError = Box<dyn error::Error + Send + Sync + 'static>;
pub type BoxedErrorResult<T> = result::Result<T, BoxedError>;

/// Convert any error into a [`BoxedError`], for call sites that only need to
/// report the error, not match on it.
pub trait BoxedErrorExt<T> {
    fn boxed(self) -> BoxedErrorResult<T>;
}

impl<T, E> BoxedErrorExt<T> for result::Result<T, E>
where
    E: error::Error + Send + Sync + 'static,
{
    fn boxed(self) -> BoxedErrorResult<T> {
        self.map_err(|e| Box::new(e) as BoxedError)
    }
}

/// Displays an error together with its whole `source()` chain, on one line.
///
/// Meant for log fields: `error = %err.fmt_compact()`.
pub struct FmtCompactError<'e, E: ?Sized>(pub &'e E);

impl<E> fmt::Display for FmtCompactError<'_, E>
where
    E: error::Error + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;

        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }

        Ok(())
    }
}

pub trait FmtCompact {
    type Report: fmt::Display;
    fn fmt_compact(self) -> Self::Report;
}

impl<'e, E> FmtCompact for &'e E
where
    E: error::Error,
{
    type Report = FmtCompactError<'e, E>;

    fn fmt_compact(self) -> Self::Report {
        FmtCompactError(self)
    }
}

#[cfg(test)]
mod tests {
    use snafu::{ResultExt as _, Snafu};

    use super::*;

    #[derive(Debug, Snafu)]
    enum Inner {
        #[snafu(display("connection reset"))]
        Reset,
    }

    #[derive(Debug, Snafu)]
    enum Outer {
        #[snafu(display("fetch failed"))]
        Fetch { source: Inner },
    }

    #[test]
    fn fmt_compact_walks_source_chain() {
        let res: result::Result<(), Inner> = ResetSnafu.fail();
        let err = res.context(FetchSnafu).unwrap_err();

        assert_eq!(
            err.fmt_compact().to_string(),
            "fetch failed: connection reset"
        );
    }

    #[test]
    fn boxed_keeps_message() {
        let res: result::Result<(), Inner> = ResetSnafu.fail();
        let err = BoxedErrorExt::boxed(res).unwrap_err();

        assert_eq!(err.to_string(), "connection reset");
    }
}
