//! Stock nodes.

mod extracter;
mod prompt_template;

pub use extracter::ExtracterNode;
pub use prompt_template::PromptTemplateNode;
