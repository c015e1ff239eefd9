pub mod block_helpers;
pub mod cmdline;
pub mod consts;
pub mod feature_buffer;
pub mod interaction_mask;
pub mod logging_layer;
pub mod model_instance;
pub mod optimizer;
pub mod persistence;
pub mod prefetch;
pub mod regressor;
pub mod restriction;
pub mod simd;
pub mod weights;
