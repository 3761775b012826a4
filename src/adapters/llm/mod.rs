pub mod http;
pub mod mock;

pub use http::HttpLLMAdapter;
pub use mock::MockLLMAdapter;
