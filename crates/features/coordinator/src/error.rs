use std::borrow::Cow;

/// Failures while decoding a request or writing a response.
#[gts_derive::gts_error]
pub enum ProtocolError {
    /// A required custom header is absent from `extFields`.
    #[error("Missing header{}: {name}", format_context(.context))]
    MissingHeader { name: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A custom header is present but cannot be interpreted.
    #[error("Invalid header{}: {message}", format_context(.context))]
    InvalidHeader { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Body error{}: {source}", format_context(.context))]
    Body { source: serde_json::Error, context: Option<Cow<'static, str>> },

    /// The frame announced more bytes than the connection accepts.
    #[error("Frame too large{}: {size} bytes exceeds {limit}", format_context(.context))]
    FrameTooLarge { size: usize, limit: usize, context: Option<Cow<'static, str>> },

    /// The underlying connection failed.
    #[error("Transport error{}: {source}", format_context(.context))]
    Transport { source: std::io::Error, context: Option<Cow<'static, str>> },
}

