pub mod credential_port;
pub mod crawler_port;
pub mod embedding_port;
pub mod llm_port;

pub use credential_port::CredentialDecryptor;
pub use crawler_port::{CrawlerPort, SearchProgress};
pub use embedding_port::EmbeddingPort;
pub use llm_port::{LLMConfig, LLMMessage, LLMPort, LLMResponse, LLMRole, LLMStreamChunk};
