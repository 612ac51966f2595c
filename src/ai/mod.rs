//! LLM-backed features: template suggestions and the document generation
//! pipeline with OOXML rendering.

pub mod client;
pub mod guardrails;
pub mod handlers;
pub mod pipeline;
pub mod render;
pub mod suggestions;

pub use client::{ChatMessage, CompletionRequest, LanguageModel, OpenAiClient};
pub use pipeline::{
    Analysis, DocumentBody, DocumentFormat, DocumentGenerator, DocumentStructure, GeneratedDocument,
    GenerationRequest, Section,
};
pub use suggestions::{Suggestion, SuggestionRequest, SuggestionService};
