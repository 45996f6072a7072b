#![allow(unreachable_pub)]
#![allow(clippy::needless_pass_by_value)]

//! # Macros
//!
//! Procedural macros shared by the transaction manager crates.
//!
//! * [`gts_error`] turns a plain enum into the workspace error shape.
//! * [`main`] boots an `async fn main` on a [`gts_runtime`] profile.
//!
//! Consumers depend on this crate directly (`gts_error`) or through the
//! `gts-runtime` re-export (`#[gts_runtime::main]`).
//!
//! [`gts_runtime`]: https://docs.rs/gts-runtime

mod macros;

use proc_macro::TokenStream;
use syn::{DeriveInput, ItemFn, parse_macro_input};

/// Attribute macro that bootstraps a Tokio runtime for `async fn main`.
///
/// # Arguments
///
/// * `coordinator` - Server profile: all cores, larger stacks, long keep-alive.
/// * `compact` - Low-footprint profile for tools and tests.
/// * `default` - Auto-detected worker threads, default stack size.
///
/// # Examples
///
/// ```rust,ignore
/// #[gts_runtime::main(coordinator)]
/// async fn main() -> anyhow::Result<()> {
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn main(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    macros::runtime::expand_main(args.into(), input).into()
}

/// Attribute macro for domain error enums.
///
/// # Generated Items
///
/// * `#[derive(Debug, thiserror::Error)]` unless already derived.
/// * A `<ErrorName>Ext` trait adding `.context(..)` to `Result<T, ErrorName>` and to
///   `Result<T, Source>` for every variant that wraps a `source`.
/// * `From<Source>` for every variant that wraps a `source`.
/// * `From<&'static str>` / `From<String>` when an `Internal { message, .. }` variant exists.
/// * A private `format_context` helper used inside `#[error(..)]` strings.
///
/// # Requirements
///
/// Every variant must use named fields and carry `context: Option<Cow<'static, str>>`.
///
/// # Example
///
/// ```rust,ignore
/// use gts_derive::gts_error;
/// use std::borrow::Cow;
///
/// #[gts_error]
/// pub enum StoreError {
///     #[error("Serialization failure{}: {source}", format_context(.context))]
///     Serialization { source: serde_json::Error, context: Option<Cow<'static, str>> },
///
///     #[error("Item not found{}: {message}", format_context(.context))]
///     ItemNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
/// ```
#[proc_macro_attribute]
pub fn gts_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    macros::error::expand_derive(input).into()
}
