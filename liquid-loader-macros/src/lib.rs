use proc_macro::TokenStream;

mod assets;

/// Embeds every file matching a glob pattern (relative to the calling
/// crate's manifest directory) as `(relative_path, contents)` pairs.
///
/// ```ignore
/// static PARTIALS: &[(&str, &str)] = embed_templates!("src/pages/partials/*.liquid");
/// let source = MemorySource::from_assets(PARTIALS);
/// ```
#[proc_macro]
pub fn embed_templates(input: TokenStream) -> TokenStream {
    assets::embed_templates_impl(input)
}
