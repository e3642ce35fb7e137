mod alter;
mod create;
mod drop;
mod revert;
mod special;
mod view;

/// Backtick-quotes an identifier for inline use.
pub(crate) fn quoted(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
