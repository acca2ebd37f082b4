//! Query and node embedding for ragdb.
//!
//! [`BgeM3Embedder`] runs BGE-M3 locally on candle; [`FakeEmbedder`] is a
//! hashing stand-in selected by `embedding.use_fake` or
//! `APP_USE_FAKE_EMBEDDINGS=1`.
use anyhow::Result;

use ragdb_core::config::EmbeddingSettings;
use ragdb_core::traits::Embedder;

mod bge;
mod device;
mod fake;
mod pool;
mod tokenize;

pub use bge::BgeM3Embedder;
pub use device::select_device;
pub use fake::FakeEmbedder;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

fn fake_requested(settings: &EmbeddingSettings) -> bool {
    settings.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    if fake_requested(settings) {
        tracing::info!(dim = settings.dimension, "using fake embedder");
        return Ok(Box::new(FakeEmbedder::new(settings.dimension)));
    }
    Ok(Box::new(BgeM3Embedder::new(settings)?))
}
