pub mod config;
pub mod image;
pub mod job;
pub mod params;

pub use config::{
    available_cores, AppConfig, OptimizerConfig, PoolConfig, TaskConfig, CONFIG_ENV_VAR,
};
pub use image::{ImageId, ImageMetadata, UploadedImage};
pub use job::{ConversionResult, ExecutionMode, Job, JobId, JobStatus};
pub use params::{ColorMode, ConversionParams, InterpolationMode, ParseParamError, Quality};

/// 16 random hex characters for opaque ids.
fn random_hex() -> String {
    use rand::Rng;
    hex::encode(rand::thread_rng().gen::<[u8; 8]>())
}
