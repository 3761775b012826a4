pub mod crawler;
pub mod embedding;
pub mod llm;
