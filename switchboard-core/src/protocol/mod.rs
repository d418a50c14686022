//! Protocol module for the generic request/response model
//!
//! This module defines the provider-agnostic data models clients speak:
//! - Chat-completion requests and responses
//! - Streaming chunks
//! - Normalized token usage

pub mod types;
pub mod usage;

pub use types::{
    ChatRequest, ChatResponse, ChatStreamChunk, ContentPart, FunctionCall, FunctionCallDelta,
    FunctionChoice, FunctionDefinition, ImageUrl, Message, MessageContent, MessageDelta,
    MessageRole, ResponseChoice, ResponseFormat, StreamChoice, StreamOptions, ToolCall,
    ToolCallDelta, ToolChoice, ToolDefinition,
};
pub use usage::{TokenUsage, UsageAccumulation, UsageFragment};
