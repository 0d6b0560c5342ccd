pub mod graph;
pub mod keywords;
pub mod parsed;
pub mod prompt;
pub mod schema;
pub mod summary;

pub use graph::parse_graph;
pub use keywords::{FlatKeywordFormat, KeywordFormat, StructuredKeywordFormat};
pub use parsed::{FallbackReason, Parsed};
pub use schema::{Graph, GraphEdge, GraphNode, KeywordEntry};
pub use summary::{CHAT_FALLBACK, SUMMARY_FALLBACK, parse_chat_reply, parse_summary};
