pub mod error;
pub mod host;
pub mod loader;
pub mod models;
pub mod pages;
pub mod resolve;
pub mod source;
pub mod tpl;
pub mod value;
pub mod walker;

pub use error::{CompileError, LoaderError, RenderError};
pub use host::{BuildHost, DependencyRegistry, ResourceHost};
pub use liquid_loader_macros::embed_templates;
pub use loader::{CompiledTemplate, compile_and_track, load, load_with_callback};
pub use models::options::LoaderOptions;
pub use source::{FsSource, MemorySource, TemplateSource};
pub use value::Value;
