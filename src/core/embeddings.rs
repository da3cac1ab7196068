use std::fmt;
use std::sync::Arc;

use image::DynamicImage;
use ndarray::Array1;

use crate::error::{AppError, Result};
use crate::state::ModelConfig;

/// A fixed-length feature vector produced by an image model.
///
/// Each embedding is owned by exactly one container (a reference set or the
/// local of a single check) and its buffer is released when that owner drops it.
#[derive(Debug, PartialEq)]
pub struct Embedding(Array1<f32>);

impl Embedding {
    /// Wrap raw model output, rejecting empty or non-finite vectors.
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(AppError::InvalidInput("embedding has no components".to_string()));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(AppError::InvalidInput(format!(
                "embedding component {} is not finite",
                pos
            )));
        }
        Ok(Self(Array1::from(values)))
    }

    /// Dimensionality of the vector.
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Borrow the underlying array.
    pub fn as_array(&self) -> &Array1<f32> {
        &self.0
    }

    /// Euclidean norm, accumulated in f64.
    pub fn norm(&self) -> f64 {
        self.0.iter().map(|&v| f64::from(v) * f64::from(v)).sum::<f64>().sqrt()
    }
}

/// Anything that turns a decoded image into an [`Embedding`].
///
/// Inference is synchronous once the provider exists; loading is the async part
/// (see [`load_model`]).
pub trait EmbeddingProvider: Send + Sync + fmt::Debug {
    /// Compute the embedding of one image.
    fn infer(&self, image: &DynamicImage) -> Result<Embedding>;

    /// Short backend description used in logs and status output.
    fn name(&self) -> &str;
}

/// Load the configured embedding model.
///
/// Fails with [`AppError::ModelUnavailable`] when the crate was built without an
/// inference backend or the weights cannot be loaded. Callers treat that as fatal
/// for the session; nothing retries.
pub async fn load_model(config: &ModelConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    #[cfg(feature = "torch")]
    {
        let config = config.clone();
        let model = tokio::task::spawn_blocking(move || torch::TorchEmbedder::load(&config))
            .await?
            .map_err(|e| AppError::ModelUnavailable(format!("{:#}", e)))?;
        log::info!("Embedding model loaded ({})", model.name());
        Ok(Arc::new(model))
    }

    #[cfg(not(feature = "torch"))]
    {
        log::debug!(
            "Requested weights {} but no inference backend is compiled in",
            config.weights_path.display()
        );
        Err(AppError::ModelUnavailable(
            "no compatible execution backend; rebuild with the `torch` feature".to_string(),
        ))
    }
}

/// Convert an image into normalized CHW planes for an ImageNet-trained network.
///
/// Returns the flat buffer in channel-major order, `3 * size * size` long.
pub fn preprocess_chw(img: &DynamicImage, size: u32) -> Vec<f32> {
    const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const STD: [f32; 3] = [0.229, 0.224, 0.225];

    let rgb = img
        .resize_exact(size, size, image::imageops::FilterType::Triangle)
        .to_rgb8();
    let plane = (size * size) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = (y * size + x) as usize;
        for c in 0..3 {
            let value = f32::from(pixel[c]) / 255.0;
            data[c * plane + idx] = (value - MEAN[c]) / STD[c];
        }
    }

    data
}

#[cfg(feature = "torch")]
mod torch {
    use std::sync::Mutex;

    use anyhow::{anyhow, Context, Result};
    use image::DynamicImage;
    use tch::nn::{FuncT, ModuleT, VarStore};
    use tch::{Device, Kind, Tensor};

    use super::{preprocess_chw, Embedding, EmbeddingProvider};
    use crate::state::ModelConfig;

    /// ResNet-18 feature extractor (final classification layer removed).
    pub(super) struct TorchEmbedder {
        net: Mutex<FuncT<'static>>,
        // Owns the weights referenced by `net`.
        _vs: VarStore,
        device: Device,
        input_size: u32,
        label: String,
    }

    impl std::fmt::Debug for TorchEmbedder {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TorchEmbedder")
                .field("device", &self.device)
                .field("input_size", &self.input_size)
                .finish()
        }
    }

    impl TorchEmbedder {
        pub(super) fn load(config: &ModelConfig) -> Result<Self> {
            let device = Device::cuda_if_available();
            log::info!("Torch backend: {:?}", device);

            let mut vs = VarStore::new(device);
            let net = tch::vision::resnet::resnet18_no_final_layer(&vs.root());
            vs.load(&config.weights_path).with_context(|| {
                format!("loading weights from {}", config.weights_path.display())
            })?;

            Ok(Self {
                net: Mutex::new(net),
                _vs: vs,
                device,
                input_size: config.input_size,
                label: format!("resnet18/{:?}", device),
            })
        }

        fn forward(&self, img: &DynamicImage) -> Result<Vec<f32>> {
            let size = i64::from(self.input_size);
            let data = preprocess_chw(img, self.input_size);
            let input = Tensor::of_slice(&data)
                .to_kind(Kind::Float)
                .view([1, 3, size, size])
                .to(self.device);

            let net = self
                .net
                .lock()
                .map_err(|_| anyhow!("embedding network lock poisoned"))?;
            let output = tch::no_grad(|| net.forward_t(&input, false))
                .to_device(Device::Cpu)
                .view([-1]);

            let numel = output.numel();
            let mut values = vec![0.0f32; numel];
            output.copy_data(&mut values, numel);
            Ok(values)
        }
    }

    impl EmbeddingProvider for TorchEmbedder {
        fn infer(&self, image: &DynamicImage) -> crate::error::Result<Embedding> {
            let values = self.forward(image)?;
            Embedding::new(values)
        }

        fn name(&self) -> &str {
            &self.label
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_embedding_rejects_bad_vectors() {
        assert!(matches!(Embedding::new(vec![]), Err(AppError::InvalidInput(_))));
        assert!(matches!(
            Embedding::new(vec![1.0, f32::NAN]),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            Embedding::new(vec![f32::INFINITY]),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_embedding_norm() {
        let embedding = Embedding::new(vec![3.0, 4.0]).unwrap();
        assert_eq!(embedding.dim(), 2);
        assert!((embedding.norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_preprocess_layout() {
        // Solid red: the R plane is maximal, G and B planes minimal
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, image::Rgb([255, 0, 0])));
        let data = preprocess_chw(&img, 4);
        assert_eq!(data.len(), 3 * 16);

        let red = (1.0 - 0.485) / 0.229;
        let green = (0.0 - 0.456) / 0.224;
        assert!(data[..16].iter().all(|v| (v - red).abs() < 1e-5));
        assert!(data[16..32].iter().all(|v| (v - green).abs() < 1e-5));
    }

    #[cfg(not(feature = "torch"))]
    #[test]
    fn test_load_model_without_backend() {
        let result = tokio_test::block_on(load_model(&ModelConfig::default()));
        assert!(matches!(result, Err(AppError::ModelUnavailable(_))));
    }
}
