//! Prompt templates and the registry they are pulled from.

mod hub;
mod template;

pub use hub::{HubClient, TemplateRegistry, parse_manifest};
pub use template::{PromptPart, PromptTemplate};

#[cfg(test)]
pub(crate) use hub::{StaticRegistry, functions_manifest};
