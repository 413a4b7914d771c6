//! Storage Adapter - 资产写出

mod wav_asset_finalizer;

pub use wav_asset_finalizer::{
    asset_stem, inspect_wav, sanitize_hint, WavAssetFinalizer, WavAssetFinalizerConfig,
};
