//! `tm-domain` — types shared by every toolmesh crate.

pub mod config;
pub mod content;
pub mod declaration;
pub mod error;
pub mod schema;
pub mod value;

pub use declaration::ToolDeclaration;
pub use error::{Error, Result};
pub use schema::{Schema, SchemaNode};
pub use value::{JsonMap, ERROR_KEY};
