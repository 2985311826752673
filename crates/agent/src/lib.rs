//! LLM-backed collaborators for the outreach pipeline.
//!
//! - `llm`: the `LlmClient` seam and an HTTP client for OpenAI-compatible,
//!   Anthropic and Ollama endpoints
//! - `content`: lead research and three-email sequence drafting
//! - `classifier`: inbound reply classification with a keyword fallback
//!
//! The model only writes prose and labels. Status changes stay in the core
//! lifecycle table, and unusable answers degrade to fixed fallback content.

pub mod classifier;
pub mod content;
pub mod extract;
pub mod http;
pub mod llm;

pub use classifier::{keyword_classification, LlmReplyClassifier};
pub use content::LlmContentGenerator;
pub use llm::{CompletionRequest, HttpLlmClient, LlmClient};
