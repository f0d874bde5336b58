use glob::glob;
use proc_macro::TokenStream;
use quote::quote;
use std::env;
use std::path::{Path, PathBuf};
use syn::{LitStr, parse_macro_input};

pub fn embed_templates_impl(input: TokenStream) -> TokenStream {
    let pattern = parse_macro_input!(input as LitStr);
    let pattern_str = pattern.value();

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            return syn::Error::new(pattern.span(), "CARGO_MANIFEST_DIR is not set")
                .to_compile_error()
                .into();
        }
    };

    let full_pattern = manifest_dir.join(&pattern_str);
    let mut files: Vec<PathBuf> = match glob(&full_pattern.to_string_lossy()) {
        Ok(paths) => paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect(),
        Err(e) => {
            return syn::Error::new(pattern.span(), format!("invalid glob pattern: {}", e))
                .to_compile_error()
                .into();
        }
    };
    // glob order is platform dependent
    files.sort();

    let entries: Vec<_> = files
        .iter()
        .map(|path| {
            let key = relative_key(&manifest_dir, path);
            let abs = path.to_string_lossy().to_string();
            quote! { (#key, include_str!(#abs)) }
        })
        .collect();

    let output = quote! {
        &[ #(#entries),* ]
    };
    output.into()
}

/// Key under which a file is served: manifest-relative, `/`-separated.
fn relative_key(manifest_dir: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(manifest_dir).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
