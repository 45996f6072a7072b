use std::borrow::Cow;

/// A specialized [`CacheError`] enum of this crate.
#[gts_derive::gts_error]
pub enum CacheError {
    /// The cache could not be reached or refused the command.
    #[error("Cache unavailable{}: {message}", format_context(.context))]
    Unavailable { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The command was rejected (e.g., malformed key pattern).
    #[error("Invalid cache command{}: {message}", format_context(.context))]
    InvalidCommand { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal cache fault{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
