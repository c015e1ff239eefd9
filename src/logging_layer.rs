use env_logger::Builder;
use log::LevelFilter;
use std::str::FromStr;

use crate::consts::LANES;

/// Level from the LOG_LEVEL value, info when unset or unknown
pub fn level_from_env_value(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| LevelFilter::from_str(v.trim()).ok())
        .unwrap_or(LevelFilter::Info)
}

pub fn initialize_logging_layer() {
    let raw = std::env::var("LOG_LEVEL").ok();
    let level = level_from_env_value(raw.as_deref());

    let mut builder = Builder::new();
    builder.filter_level(level);
    if builder.try_init().is_ok() {
        log::info!("Initialized the logger at level {} ..", level);
    }
    if let Some(raw) = raw {
        if LevelFilter::from_str(raw.trim()).is_err() {
            log::warn!("Unknown LOG_LEVEL {:?}, using info", raw);
        }
    }

    let features = detected_vector_features();
    if features.is_empty() {
        log::info!("No vector CPU features detected, {}-lane chunks run as scalar code ..", LANES);
    } else {
        log::info!(
            "Detected CPU features: {}, {}-lane chunks get lowered onto them",
            features.join(", "),
            LANES
        );
    }
}

/// Vector extensions the embedding kernels can be lowered to on this CPU
#[cfg(target_arch = "x86_64")]
pub fn detected_vector_features() -> Vec<&'static str> {
    let candidates = [
        ("AVX", is_x86_feature_detected!("avx")),
        ("AVX2", is_x86_feature_detected!("avx2")),
        ("AVX512F", is_x86_feature_detected!("avx512f")),
        ("FMA", is_x86_feature_detected!("fma")),
    ];
    candidates.iter().filter(|(_, present)| *present).map(|(name, _)| *name).collect()
}

#[cfg(not(target_arch = "x86_64"))]
pub fn detected_vector_features() -> Vec<&'static str> {
    Vec::new()
}
