pub mod mock;

pub use mock::MockEmbeddingAdapter;
