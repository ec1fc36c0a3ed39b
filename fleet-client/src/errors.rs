//! User-facing error kinds and the top-level error reporter.

use tracing::debug;

/// An error meant to be shown to the user as-is, without a cause chain.
///
/// Anything else reaching the top level is treated as an unexpected fault.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ExpectedError(pub String);

impl ExpectedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub fn is_expected(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ExpectedError>().is_some()
}

/// Render `err` for the terminal and return the process exit code.
pub fn report(err: &anyhow::Error) -> i32 {
    eprintln!("{}", render(err));
    if !is_expected(err) {
        debug!("{:?}", err);
    }
    1
}

fn render(err: &anyhow::Error) -> String {
    if let Some(expected) = err.downcast_ref::<ExpectedError>() {
        return expected.to_string();
    }
    let mut out = format!("Error: {}", err);
    for cause in err.chain().skip(1) {
        out.push_str(&format!("\nCaused by: {}", cause));
    }
    out
}
