//! Static dependency resolution for JavaScript and TypeScript sources

pub mod extractor;
pub mod paths;
pub mod resolver;
pub mod static_resolver;


pub use extractor::{SourceKind, extract_specifiers};
pub use resolver::{Resolution, ResolveOptions, Resolver};
pub use static_resolver::StaticResolver;
