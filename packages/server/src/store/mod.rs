pub mod metadata;

pub use metadata::{DbMetadataStore, MetaError, MetadataStore, NewSkin};
