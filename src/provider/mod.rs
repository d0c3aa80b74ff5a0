mod traits;
mod anthropic;
mod openai;
mod registry;

pub use traits::*;
pub use anthropic::AnthropicChatModel;
pub use openai::OpenAIChatModel;
pub use registry::{kind_for_model, ModelRegistry};
