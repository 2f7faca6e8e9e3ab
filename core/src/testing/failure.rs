use std::fmt::{self, Debug};

/// A check observed something other than what it expected.
///
/// This is the only error kind a [`TestGroup`](super::TestGroup) recovers from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AssertionFailure {
    pub message: String,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Puts `headline` above the current message.
    #[must_use]
    pub fn within(self, headline: impl fmt::Display) -> Self {
        Self::new(format!("{}\n{}", headline, self.message))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Failed(#[from] AssertionFailure),

    /// Anything that is not the candidate's fault: spawn errors, pty I/O, unreadable files.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

pub type CheckResult<T = ()> = std::result::Result<T, CheckError>;

/// Returns early with an [`AssertionFailure`] built from a format string.
#[macro_export]
macro_rules! fail {
    ($($arg:tt)*) => {
        return Err($crate::testing::AssertionFailure::new(format!($($arg)*)).into())
    };
}

/// Byte-exact comparison of a captured stream.
///
/// Text spanning more than three lines is quoted verbatim, anything shorter is escaped.
pub fn ensure_same_text(field: &str, got: &[u8], want: &[u8]) -> Result<(), AssertionFailure> {
    if got == want {
        return Ok(());
    }
    let got = String::from_utf8_lossy(got);
    let want = String::from_utf8_lossy(want);
    let msg = if got.matches('\n').count() > 3 {
        format!("{} not equal: \"{}\" and \"{}\"", field, got, want)
    } else {
        format!("{} not equal: {:?} and {:?}", field, got, want)
    };
    Err(AssertionFailure::new(msg))
}

pub fn ensure_same<T>(field: &str, got: T, want: T) -> Result<(), AssertionFailure>
where
    T: PartialEq + Debug,
{
    if got == want {
        Ok(())
    } else {
        Err(AssertionFailure::new(format!(
            "{} not equal: {:?} and {:?}",
            field, got, want
        )))
    }
}
