//! Schema construction.
//!
//! ## Components
//!
//! - [`SchemaAssembler`] - turns registry types into an executable schema
//! - [`register_document`] - registers the types of a parsed SDL document
//!
//! Typed endpoints assemble their registered root types directly. SDL
//! endpoints first register every definition of their document in a fresh
//! registry, decorated with the endpoint's resolvers, then assemble.

mod assembler;
mod sdl;

pub use assembler::{RootTypes, SchemaAssembler, SchemaLimits};
pub use sdl::{SdlTypes, register_document};
